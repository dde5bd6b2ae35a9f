//! Compiled operation registry
//!
//! The registry is the output of compiling one schema. It is immutable and
//! shared read-only across concurrent requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::{
    FetchOperation, FieldOperation, MutationOperation, MutationOperationBuilder,
    QueryOperationBuilder, TableCompiler, TableDescriptor, TableFields,
};
use crate::error::Result;
use crate::observability::{log_event_with_fields, Event};
use crate::schema::Schema;

/// Every operation derived from a schema
#[derive(Debug)]
pub struct Registry {
    tables: BTreeMap<String, Arc<TableDescriptor>>,
    queries: BTreeMap<String, FetchOperation>,
    mutations: BTreeMap<String, MutationOperation>,
    fields: BTreeMap<String, TableFields>,
    compilations: usize,
}

impl Registry {
    /// Compile the query and mutation roots of `schema`.
    ///
    /// Only tables reachable from a root are compiled.
    pub fn compile(schema: &Schema) -> Result<Self> {
        let mut compiler = TableCompiler::new(schema);
        let queries = QueryOperationBuilder::build_roots(&mut compiler)?;
        let mutations = MutationOperationBuilder::build(&mut compiler)?;
        let compilations = compiler.compilations();
        let tables = compiler.into_tables();
        let fields = QueryOperationBuilder::build_fields(&tables)?;

        let table_count = tables.len().to_string();
        let query_count = queries.len().to_string();
        let mutation_count = mutations.len().to_string();
        log_event_with_fields(
            Event::SchemaCompiled,
            &[
                ("mutations", mutation_count.as_str()),
                ("queries", query_count.as_str()),
                ("tables", table_count.as_str()),
            ],
        );

        Ok(Self {
            tables,
            queries,
            mutations,
            fields,
            compilations,
        })
    }

    pub fn table(&self, name: &str) -> Option<&Arc<TableDescriptor>> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDescriptor>> {
        self.tables.values()
    }

    pub fn query(&self, name: &str) -> Option<&FetchOperation> {
        self.queries.get(name)
    }

    pub fn queries(&self) -> impl Iterator<Item = (&String, &FetchOperation)> {
        self.queries.iter()
    }

    pub fn mutation(&self, name: &str) -> Option<&MutationOperation> {
        self.mutations.get(name)
    }

    pub fn mutations(&self) -> impl Iterator<Item = (&String, &MutationOperation)> {
        self.mutations.iter()
    }

    /// Field operation for `column` of `table`
    pub fn field(&self, table: &str, column: &str) -> Option<&FieldOperation> {
        self.fields.get(table).and_then(|f| f.get(column))
    }

    /// Number of table descriptors built while compiling
    pub fn compilations(&self) -> usize {
        self.compilations
    }
}
