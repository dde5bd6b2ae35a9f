//! Table compilation
//!
//! A table is an object type with at least two fields, one of which is the
//! identifier column `id: ID!`. Compiling a table classifies every column
//! and compiles every referenced table.
//!
//! Compilation is memoized by table name. A slot is marked `Compiling`
//! before the columns are visited, so a reference back to a table that is
//! still being compiled (self or mutual references) terminates instead of
//! recursing. Every table is built at most once and every lookup returns the
//! same shared descriptor.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::column::{classify, ColumnDescriptor};
use crate::error::{Error, Result, SchemaViolation};
use crate::kv::ID_COLUMN;
use crate::observability::{log_event_with_fields, Event};
use crate::schema::{Schema, TypeKind, TypeRef, ID_SCALAR};

/// Immutable description of one table
#[derive(Debug, PartialEq, Eq)]
pub struct TableDescriptor {
    name: String,
    /// Columns in declaration order, `id` included
    columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Every column except the identifier
    pub fn data_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.name != ID_COLUMN)
    }
}

enum Slot {
    Compiling,
    Ready(Arc<TableDescriptor>),
}

/// Memoizing table compiler for one schema
pub struct TableCompiler<'s> {
    schema: &'s Schema,
    memo: HashMap<String, Slot>,
    compilations: usize,
}

impl<'s> TableCompiler<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            memo: HashMap::new(),
            compilations: 0,
        }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Compile a table (and, transitively, every table it references).
    ///
    /// Repeated calls return the same descriptor without rebuilding it.
    pub fn compile(&mut self, name: &str) -> Result<Arc<TableDescriptor>> {
        self.ensure(name)?;
        match self.memo.get(name) {
            Some(Slot::Ready(descriptor)) => Ok(Arc::clone(descriptor)),
            _ => Err(Error::invalid_schema(SchemaViolation::new(
                name,
                "a fully compiled table",
                "compilation still in progress",
            ))),
        }
    }

    /// Number of descriptors actually built so far
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    /// Every compiled table by name
    pub fn into_tables(self) -> BTreeMap<String, Arc<TableDescriptor>> {
        self.memo
            .into_iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Ready(descriptor) => Some((name, descriptor)),
                Slot::Compiling => None,
            })
            .collect()
    }

    fn ensure(&mut self, name: &str) -> Result<()> {
        if self.memo.contains_key(name) {
            return Ok(());
        }

        self.memo.insert(name.to_string(), Slot::Compiling);
        match self.build(name) {
            Ok(descriptor) => {
                self.compilations += 1;
                let columns = descriptor.columns.len().to_string();
                log_event_with_fields(
                    Event::TableCompiled,
                    &[("columns", columns.as_str()), ("table", name)],
                );
                self.memo
                    .insert(name.to_string(), Slot::Ready(Arc::new(descriptor)));
                Ok(())
            }
            Err(e) => {
                self.memo.remove(name);
                Err(e)
            }
        }
    }

    fn build(&mut self, name: &str) -> Result<TableDescriptor> {
        let schema = self.schema;
        let ty = schema
            .get(name)
            .ok_or_else(|| Error::invalid_schema(SchemaViolation::unknown_type("$table", name)))?;

        if ty.kind != TypeKind::Object {
            return Err(Error::invalid_schema(SchemaViolation::new(
                name,
                "an object type",
                ty.kind.kind_name(),
            )));
        }

        if ty.fields.len() < 2 {
            return Err(Error::invalid_schema(SchemaViolation::new(
                name,
                "at least two columns",
                format!("{} columns", ty.fields.len()),
            )));
        }

        let id_type = TypeRef::non_null(TypeRef::named(ID_SCALAR));
        match ty.field(ID_COLUMN) {
            Some(field) if field.ty == id_type => {}
            Some(field) => {
                return Err(Error::invalid_schema(SchemaViolation::new(
                    format!("{}.{}", name, ID_COLUMN),
                    "ID!",
                    field.ty.to_string(),
                )));
            }
            None => {
                return Err(Error::invalid_schema(SchemaViolation::missing(
                    format!("{}.{}", name, ID_COLUMN),
                    "an identifier column 'id: ID!'",
                )));
            }
        }

        let mut columns = Vec::with_capacity(ty.fields.len());
        for field in &ty.fields {
            let column = classify(schema, name, field)?;
            if let Some(target) = column.kind.target() {
                self.ensure(target)?;
            }
            columns.push(column);
        }

        Ok(TableDescriptor {
            name: name.to_string(),
            columns,
        })
    }
}
