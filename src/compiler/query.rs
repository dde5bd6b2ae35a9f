//! Query operations
//!
//! Root fetch operations (one per field of the query type) and per-table
//! field operations (one per column) that expand references.
//!
//! Referential integrity is enforced lazily: a reference to a missing row
//! is reported as database corruption when it is read, not when written.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::column::ColumnKind;
use super::table::{TableCompiler, TableDescriptor};
use crate::error::{Corruption, Error, Result, SchemaViolation};
use crate::kv::{Key, KvStore, ID_COLUMN};
use crate::output::Output;
use crate::row::{Row, RowId};
use crate::schema::{FieldDef, TypeKind, TypeRef, ID_SCALAR};

/// Field operations of one table, by column name
pub type TableFields = BTreeMap<String, FieldOperation>;

/// Root fetch of one row by id
#[derive(Debug, Clone)]
pub struct FetchOperation {
    table: Arc<TableDescriptor>,
}

impl FetchOperation {
    pub fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    /// Fetch the row named by the `id` argument; a missing row is `Null`.
    pub async fn invoke(&self, store: &dyn KvStore, args: &Value) -> Result<Output> {
        let id = id_argument(args)?;
        Ok(match read_row(store, &self.table, id).await? {
            Some(row) => Output::Row(row),
            None => Output::Null,
        })
    }
}

/// Resolution of one column of a fetched row
#[derive(Debug, Clone)]
pub enum FieldOperation {
    /// Stored value passes through
    Leaf { column: String },
    /// Expand one referenced row
    SingleReference {
        table: String,
        column: String,
        nullable: bool,
        target: Arc<TableDescriptor>,
    },
    /// Expand every referenced row in one batched read
    ReferenceList {
        table: String,
        column: String,
        nullable: bool,
        element_nullable: bool,
        target: Arc<TableDescriptor>,
    },
}

impl FieldOperation {
    pub async fn invoke(&self, store: &dyn KvStore, parent: &Row) -> Result<Output> {
        match self {
            FieldOperation::Leaf { column } => Ok(match parent.get(column) {
                Some(value) => Output::Value(value.clone()),
                None => Output::Null,
            }),
            FieldOperation::SingleReference {
                table,
                column,
                nullable,
                target,
            } => {
                let Some(stored) = parent.get(column) else {
                    return missing(*nullable, table, parent.id(), column);
                };
                let id = stored_id(table, column, stored)?;
                match read_row(store, target, id).await? {
                    Some(row) => Ok(Output::Row(row)),
                    None => Err(Error::corruption(Corruption::DanglingReferences {
                        table: table.clone(),
                        column: column.clone(),
                        target: target.name().to_string(),
                        ids: vec![id],
                    })),
                }
            }
            FieldOperation::ReferenceList {
                table,
                column,
                nullable,
                element_nullable,
                target,
            } => {
                let Some(stored) = parent.get(column) else {
                    return missing(*nullable, table, parent.id(), column);
                };
                let Value::Array(items) = stored else {
                    return Err(malformed(table, column, format!("expected an id list, got {}", stored)));
                };
                if items.is_empty() {
                    if *element_nullable {
                        return Ok(Output::Rows(Vec::new()));
                    }
                    return Err(Error::corruption(Corruption::EmptyReferenceList {
                        table: table.clone(),
                        id: parent.id(),
                        column: column.clone(),
                    }));
                }

                let ids = items
                    .iter()
                    .map(|item| stored_id(table, column, item))
                    .collect::<Result<Vec<_>>>()?;

                let rows = read_rows(store, target, &ids).await?;
                let mut found = Vec::with_capacity(rows.len());
                let mut dangling = Vec::new();
                for (id, row) in ids.iter().zip(rows) {
                    match row {
                        Some(row) => found.push(row),
                        None => dangling.push(*id),
                    }
                }

                if !dangling.is_empty() {
                    return Err(Error::corruption(Corruption::DanglingReferences {
                        table: table.clone(),
                        column: column.clone(),
                        target: target.name().to_string(),
                        ids: dangling,
                    }));
                }
                Ok(Output::Rows(found))
            }
        }
    }
}

fn missing(nullable: bool, table: &str, id: RowId, column: &str) -> Result<Output> {
    if nullable {
        Ok(Output::Null)
    } else {
        Err(Error::corruption(Corruption::MissingValue {
            table: table.to_string(),
            id,
            column: column.to_string(),
        }))
    }
}

fn malformed(table: &str, column: &str, reason: String) -> Error {
    Error::corruption(Corruption::MalformedValue {
        table: table.to_string(),
        column: column.to_string(),
        reason,
    })
}

fn stored_id(table: &str, column: &str, value: &Value) -> Result<RowId> {
    RowId::from_json(value).map_err(|e| malformed(table, column, e.to_string()))
}

/// Parse the `id` argument of a fetch or delete.
pub(crate) fn id_argument(args: &Value) -> Result<RowId> {
    match args.get(ID_COLUMN) {
        Some(value) => RowId::from_json(value),
        None => Err(Error::invalid_input("missing argument 'id'")),
    }
}

/// Read one row.
pub(crate) async fn read_row(
    store: &dyn KvStore,
    table: &TableDescriptor,
    id: RowId,
) -> Result<Option<Row>> {
    let mut rows = read_rows(store, table, &[id]).await?;
    Ok(rows.pop().flatten())
}

/// Read several rows of one table in a single batched store call.
///
/// Output order matches `ids`; missing rows are `None`.
pub(crate) async fn read_rows(
    store: &dyn KvStore,
    table: &TableDescriptor,
    ids: &[RowId],
) -> Result<Vec<Option<Row>>> {
    let columns = table.columns();
    let keys: Vec<Key> = ids
        .iter()
        .flat_map(|id| {
            columns
                .iter()
                .map(move |c| Key::column(table.name(), *id, &c.name))
        })
        .collect();

    let entries = store.get_many(&keys).await?;

    let mut rows = Vec::with_capacity(ids.len());
    for (id, chunk) in ids.iter().zip(entries.chunks(columns.len())) {
        let mut values = Map::new();
        let mut versionstamp = None;
        for (column, entry) in columns.iter().zip(chunk) {
            let Some(entry) = entry else {
                continue;
            };
            if column.name == ID_COLUMN {
                versionstamp = Some(entry.versionstamp);
            }
            values.insert(column.name.clone(), entry.value.clone());
        }
        rows.push(versionstamp.map(|vs| Row::new(table.name(), *id, values, vs)));
    }
    Ok(rows)
}

/// Compiles root fetch operations and per-table field operations.
pub struct QueryOperationBuilder;

impl QueryOperationBuilder {
    /// Compile one fetch operation per field of the query root type.
    pub fn build_roots(compiler: &mut TableCompiler<'_>) -> Result<BTreeMap<String, FetchOperation>> {
        let schema = compiler.schema();
        let mut roots = BTreeMap::new();
        let Some(query) = schema.query_type() else {
            return Ok(roots);
        };

        for field in &query.fields {
            let location = format!("{}.{}", query.name, field.name);
            let table = Self::fetch_target(compiler, &location, field)?;
            roots.insert(field.name.clone(), FetchOperation { table });
        }
        Ok(roots)
    }

    fn fetch_target(
        compiler: &mut TableCompiler<'_>,
        location: &str,
        field: &FieldDef,
    ) -> Result<Arc<TableDescriptor>> {
        check_id_argument(location, field)?;

        let (inner, _) = field.ty.unwrap_non_null();
        let TypeRef::Named(name) = inner else {
            return Err(Error::invalid_schema(SchemaViolation::new(
                location,
                "an object return type",
                field.ty.to_string(),
            )));
        };
        if compiler.schema().kind_of(name) != Some(TypeKind::Object) {
            return Err(Error::invalid_schema(SchemaViolation::new(
                location,
                "an object return type",
                field.ty.to_string(),
            )));
        }
        compiler.compile(name)
    }

    /// Compile the field operations of every table, each table once.
    pub fn build_fields(
        tables: &BTreeMap<String, Arc<TableDescriptor>>,
    ) -> Result<BTreeMap<String, TableFields>> {
        let mut fields = BTreeMap::new();
        for (name, table) in tables {
            let mut ops = TableFields::new();
            for column in table.columns() {
                let op = match &column.kind {
                    ColumnKind::Leaf => FieldOperation::Leaf {
                        column: column.name.clone(),
                    },
                    ColumnKind::SingleReference { table: target } => {
                        FieldOperation::SingleReference {
                            table: name.clone(),
                            column: column.name.clone(),
                            nullable: column.nullable,
                            target: lookup(tables, name, &column.name, target)?,
                        }
                    }
                    ColumnKind::ReferenceList {
                        table: target,
                        element_nullable,
                    } => FieldOperation::ReferenceList {
                        table: name.clone(),
                        column: column.name.clone(),
                        nullable: column.nullable,
                        element_nullable: *element_nullable,
                        target: lookup(tables, name, &column.name, target)?,
                    },
                };
                ops.insert(column.name.clone(), op);
            }
            fields.insert(name.clone(), ops);
        }
        Ok(fields)
    }
}

/// Require exactly one argument `id: ID!`.
pub(crate) fn check_id_argument(location: &str, field: &FieldDef) -> Result<()> {
    let id_type = TypeRef::non_null(TypeRef::named(ID_SCALAR));
    match field.args.as_slice() {
        [arg] if arg.name == ID_COLUMN && arg.ty == id_type => Ok(()),
        args => {
            let actual: Vec<String> = args
                .iter()
                .map(|a| format!("{}: {}", a.name, a.ty))
                .collect();
            Err(Error::invalid_schema(SchemaViolation::new(
                location,
                "exactly one argument 'id: ID!'",
                format!("({})", actual.join(", ")),
            )))
        }
    }
}

fn lookup(
    tables: &BTreeMap<String, Arc<TableDescriptor>>,
    table: &str,
    column: &str,
    target: &str,
) -> Result<Arc<TableDescriptor>> {
    tables.get(target).cloned().ok_or_else(|| {
        Error::invalid_schema(SchemaViolation::unknown_type(
            format!("{}.{}", table, column),
            target,
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{AtomicOperation, MemoryStore};
    use crate::schema::{Schema, SchemaLoader};
    use serde_json::json;

    fn schema() -> Schema {
        SchemaLoader::from_value(json!({
            "query": "Query",
            "types": [
                { "name": "Author", "kind": "object", "fields": [
                    { "name": "id", "type": "ID!" },
                    { "name": "name", "type": "String!" }
                ]},
                { "name": "Shelf", "kind": "object", "fields": [
                    { "name": "id", "type": "ID!" },
                    { "name": "owner", "type": "Author" },
                    { "name": "authors", "type": "[Author!]!" },
                    { "name": "guests", "type": "[Author]" }
                ]},
                { "name": "Query", "kind": "object", "fields": [
                    { "name": "shelf", "type": "Shelf", "args": [{ "name": "id", "type": "ID!" }] }
                ]}
            ]
        }))
        .unwrap()
    }

    fn rid(v: u64) -> RowId {
        RowId::new(v).unwrap()
    }

    async fn put(store: &MemoryStore, entries: Vec<(Key, Value)>) {
        let mut op = AtomicOperation::new();
        for (k, v) in entries {
            op.set(k, v);
        }
        assert!(store.commit(op).await.unwrap().is_committed());
    }

    async fn put_author(store: &MemoryStore, id: u64) {
        put(
            store,
            vec![
                (Key::id("Author", rid(id)), json!(id.to_string())),
                (Key::column("Author", rid(id), "name"), json!(format!("A{}", id))),
            ],
        )
        .await;
    }

    fn compile(schema: &Schema) -> (BTreeMap<String, FetchOperation>, BTreeMap<String, TableFields>) {
        let mut compiler = TableCompiler::new(schema);
        let roots = QueryOperationBuilder::build_roots(&mut compiler).unwrap();
        let fields = QueryOperationBuilder::build_fields(&compiler.into_tables()).unwrap();
        (roots, fields)
    }

    fn shelf(values: Value) -> Row {
        let Value::Object(values) = values else { unreachable!() };
        Row::new("Shelf", rid(1), values, crate::kv::Versionstamp::new(1))
    }

    #[tokio::test]
    async fn test_fetch_missing_row_is_null() {
        let schema = schema();
        let (roots, _) = compile(&schema);
        let store = MemoryStore::new();

        let out = roots["shelf"].invoke(&store, &json!({ "id": "9" })).await.unwrap();
        assert!(out.is_null());
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_id() {
        let schema = schema();
        let (roots, _) = compile(&schema);
        let store = MemoryStore::new();

        let err = roots["shelf"].invoke(&store, &json!({ "id": "0" })).await.unwrap_err();
        assert_eq!(err.code(), "KV_INVALID_INPUT");
        let err = roots["shelf"].invoke(&store, &json!({})).await.unwrap_err();
        assert_eq!(err.code(), "KV_INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_fetch_reads_all_columns() {
        let schema = schema();
        let (roots, _) = compile(&schema);
        let store = MemoryStore::new();
        put_author(&store, 4).await;

        let out = roots
            .get("shelf")
            .unwrap()
            .table()
            .column("authors")
            .map(|c| c.nullable);
        assert_eq!(out, Some(false));

        let author = read_row(&store, &compile_author(&schema), rid(4)).await.unwrap().unwrap();
        assert_eq!(author.to_json(), json!({ "id": "4", "name": "A4" }));
    }

    fn compile_author(schema: &Schema) -> Arc<TableDescriptor> {
        TableCompiler::new(schema).compile("Author").unwrap()
    }

    #[tokio::test]
    async fn test_nullable_reference_absent_is_null() {
        let schema = schema();
        let (_, fields) = compile(&schema);
        let store = MemoryStore::new();

        let row = shelf(json!({ "id": "1", "authors": ["1"] }));
        let out = fields["Shelf"]["owner"].invoke(&store, &row).await.unwrap();
        assert!(out.is_null());
    }

    #[tokio::test]
    async fn test_required_list_absent_is_corruption() {
        let schema = schema();
        let (_, fields) = compile(&schema);
        let store = MemoryStore::new();

        let row = shelf(json!({ "id": "1" }));
        let err = fields["Shelf"]["authors"].invoke(&store, &row).await.unwrap_err();
        assert!(matches!(
            err,
            Error::DatabaseCorruption(Corruption::MissingValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_dangling_single_reference() {
        let schema = schema();
        let (_, fields) = compile(&schema);
        let store = MemoryStore::new();

        let row = shelf(json!({ "id": "1", "owner": "5", "authors": [] }));
        let err = fields["Shelf"]["owner"].invoke(&store, &row).await.unwrap_err();
        match err {
            Error::DatabaseCorruption(Corruption::DanglingReferences { ids, .. }) => {
                assert_eq!(ids, vec![rid(5)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_names_every_missing_id() {
        let schema = schema();
        let (_, fields) = compile(&schema);
        let store = MemoryStore::new();
        put_author(&store, 1).await;
        put_author(&store, 3).await;

        let row = shelf(json!({ "id": "1", "authors": ["1", "2", "3"] }));
        let err = fields["Shelf"]["authors"].invoke(&store, &row).await.unwrap_err();
        match err {
            Error::DatabaseCorruption(Corruption::DanglingReferences { ids, target, .. }) => {
                assert_eq!(ids, vec![rid(2)]);
                assert_eq!(target, "Author");
            }
            other => panic!("unexpected {:?}", other),
        }

        let row = shelf(json!({ "id": "1", "authors": ["7", "8"] }));
        let err = fields["Shelf"]["authors"].invoke(&store, &row).await.unwrap_err();
        match err {
            Error::DatabaseCorruption(Corruption::DanglingReferences { ids, .. }) => {
                assert_eq!(ids, vec![rid(7), rid(8)]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_expands_in_order() {
        let schema = schema();
        let (_, fields) = compile(&schema);
        let store = MemoryStore::new();
        put_author(&store, 1).await;
        put_author(&store, 2).await;

        let row = shelf(json!({ "id": "1", "authors": ["2", "1"] }));
        let out = fields["Shelf"]["authors"].invoke(&store, &row).await.unwrap();
        let ids: Vec<u64> = out.as_rows().unwrap().iter().map(|r| r.id().value()).collect();
        assert_eq!(ids, [2, 1]);
    }

    #[tokio::test]
    async fn test_empty_list_depends_on_element_nullability() {
        let schema = schema();
        let (_, fields) = compile(&schema);
        let store = MemoryStore::new();

        let row = shelf(json!({ "id": "1", "authors": [], "guests": [] }));
        let out = fields["Shelf"]["guests"].invoke(&store, &row).await.unwrap();
        assert_eq!(out.as_rows().map(|r| r.len()), Some(0));

        let err = fields["Shelf"]["authors"].invoke(&store, &row).await.unwrap_err();
        assert!(matches!(
            err,
            Error::DatabaseCorruption(Corruption::EmptyReferenceList { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_list_is_corruption() {
        let schema = schema();
        let (_, fields) = compile(&schema);
        let store = MemoryStore::new();

        let row = shelf(json!({ "id": "1", "authors": "1" }));
        let err = fields["Shelf"]["authors"].invoke(&store, &row).await.unwrap_err();
        assert!(matches!(
            err,
            Error::DatabaseCorruption(Corruption::MalformedValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_leaf_passes_through() {
        let schema = schema();
        let (_, fields) = compile(&schema);
        let store = MemoryStore::new();

        let row = shelf(json!({ "id": "1", "authors": [] }));
        let out = fields["Shelf"]["id"].invoke(&store, &row).await.unwrap();
        assert_eq!(out.as_value(), Some(&json!("1")));
    }

    #[test]
    fn test_query_field_needs_id_argument() {
        let mut doc = json!({
            "query": "Query",
            "types": [
                { "name": "Author", "kind": "object", "fields": [
                    { "name": "id", "type": "ID!" },
                    { "name": "name", "type": "String!" }
                ]},
                { "name": "Query", "kind": "object", "fields": [
                    { "name": "author", "type": "Author", "args": [{ "name": "id", "type": "ID" }] }
                ]}
            ]
        });
        let schema = SchemaLoader::from_value(doc.clone()).unwrap();
        assert!(QueryOperationBuilder::build_roots(&mut TableCompiler::new(&schema)).is_err());

        doc["types"][1]["fields"][0]["args"] = json!([]);
        let schema = SchemaLoader::from_value(doc).unwrap();
        assert!(QueryOperationBuilder::build_roots(&mut TableCompiler::new(&schema)).is_err());
    }

    #[test]
    fn test_query_field_needs_object_return() {
        let schema = SchemaLoader::from_value(json!({
            "query": "Query",
            "types": [
                { "name": "Query", "kind": "object", "fields": [
                    { "name": "count", "type": "Int", "args": [{ "name": "id", "type": "ID!" }] }
                ]}
            ]
        }))
        .unwrap();
        let err = QueryOperationBuilder::build_roots(&mut TableCompiler::new(&schema)).unwrap_err();
        assert_eq!(err.code(), "KV_INVALID_SCHEMA");
    }
}
