//! Schema Compilation Tests
//!
//! Structural rules enforced while compiling a schema into operations:
//! - Each referenced table is compiled once and shared
//! - Tables need an `id: ID!` column and supported column shapes
//! - Insert inputs must mirror the table's data columns
//! - Mutation fields carry exactly one write directive
//!
//! Every rejected schema is reported with the location that broke the rule.

use std::path::Path;
use std::sync::Arc;

use kvschema::compiler::{FieldOperation, MutationOperation, SubMutation};
use kvschema::{Error, Registry, SchemaLoader, SchemaViolation};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn fixture() -> Value {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/library.json");
    let text = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&text).unwrap()
}

fn compile(doc: Value) -> kvschema::Result<Registry> {
    Registry::compile(&SchemaLoader::from_value(doc)?)
}

/// Mutable access to the declaration of type `name`.
fn type_mut<'a>(doc: &'a mut Value, name: &str) -> &'a mut Value {
    doc["types"]
        .as_array_mut()
        .unwrap()
        .iter_mut()
        .find(|t| t["name"] == name)
        .unwrap()
}

/// Mutable access to field `field` of type `ty`.
fn field_mut<'a>(doc: &'a mut Value, ty: &str, field: &str) -> &'a mut Value {
    type_mut(doc, ty)["fields"]
        .as_array_mut()
        .unwrap()
        .iter_mut()
        .find(|f| f["name"] == field)
        .unwrap()
}

fn push_field(doc: &mut Value, ty: &str, field: Value) {
    type_mut(doc, ty)["fields"].as_array_mut().unwrap().push(field);
}

fn remove_field(doc: &mut Value, ty: &str, field: &str) {
    type_mut(doc, ty)["fields"]
        .as_array_mut()
        .unwrap()
        .retain(|f| f["name"] != field);
}

fn violation(result: kvschema::Result<Registry>) -> SchemaViolation {
    match result {
        Err(Error::InvalidSchema(v)) => v,
        Err(other) => panic!("expected a schema violation, got {:?}", other),
        Ok(_) => panic!("expected a schema violation, schema compiled"),
    }
}

// =============================================================================
// Table Sharing Tests
// =============================================================================

/// The fixture compiles each of its three tables exactly once.
#[test]
fn test_fixture_compiles_each_table_once() {
    let registry = compile(fixture()).unwrap();

    assert_eq!(registry.compilations(), 3);
    let names: Vec<&str> = registry.tables().map(|t| t.name()).collect();
    assert_eq!(names, ["Author", "Book", "Shelf"]);
}

/// Queries, fields and mutations naming a table hold the same descriptor.
#[test]
fn test_descriptors_are_shared() {
    let registry = compile(fixture()).unwrap();
    let author = registry.table("Author").unwrap();
    let shelf = registry.table("Shelf").unwrap();

    assert!(Arc::ptr_eq(author, registry.query("author").unwrap().table()));
    match registry.field("Book", "author").unwrap() {
        FieldOperation::SingleReference { target, .. } => assert!(Arc::ptr_eq(author, target)),
        other => panic!("unexpected {:?}", other),
    }
    match registry.field("Shelf", "next").unwrap() {
        FieldOperation::SingleReference { target, .. } => assert!(Arc::ptr_eq(shelf, target)),
        other => panic!("unexpected {:?}", other),
    }
    match registry.mutation("insertAuthor").unwrap() {
        MutationOperation::Insert(op) => assert!(Arc::ptr_eq(author, op.table())),
        other => panic!("unexpected {:?}", other),
    }
    match registry.mutation("catalog").unwrap() {
        MutationOperation::Transaction(op) => match op.sub_mutations().get("removeAuthors") {
            Some(SubMutation::Delete(table)) => assert!(Arc::ptr_eq(author, table)),
            other => panic!("unexpected {:?}", other),
        },
        other => panic!("unexpected {:?}", other),
    }
}

/// Tables referencing each other compile once each.
#[test]
fn test_mutual_references_compile_once() {
    let mut doc = fixture();
    push_field(&mut doc, "Author", json!({ "name": "favorite", "type": "Book" }));
    push_field(&mut doc, "AuthorInput", json!({ "name": "favorite", "type": "ID" }));

    let registry = compile(doc).unwrap();
    assert_eq!(registry.compilations(), 3);

    let book = registry.table("Book").unwrap();
    match registry.field("Author", "favorite").unwrap() {
        FieldOperation::SingleReference { target, nullable, .. } => {
            assert!(Arc::ptr_eq(book, target));
            assert!(*nullable);
        }
        other => panic!("unexpected {:?}", other),
    }
}

/// A schema without a mutation root compiles to queries only.
#[test]
fn test_query_only_schema() {
    let mut doc = fixture();
    doc.as_object_mut().unwrap().remove("mutation");

    let registry = compile(doc).unwrap();
    assert_eq!(registry.mutations().count(), 0);
    assert_eq!(registry.queries().count(), 3);
}

// =============================================================================
// Table Shape Tests
// =============================================================================

/// A table must declare `id: ID!`.
#[test]
fn test_missing_id_column() {
    let mut doc = fixture();
    remove_field(&mut doc, "Author", "id");

    let v = violation(compile(doc));
    assert_eq!(v.location, "Author.id");
    assert_eq!(v.actual, "missing");
}

/// An id column of any other type is rejected.
#[test]
fn test_mistyped_id_column() {
    let mut doc = fixture();
    field_mut(&mut doc, "Author", "id")["type"] = json!("Int!");

    let v = violation(compile(doc));
    assert_eq!(v.location, "Author.id");
    assert_eq!(v.actual, "Int!");
}

/// Lists of scalars have no storage layout.
#[test]
fn test_list_of_scalars_rejected() {
    let mut doc = fixture();
    push_field(&mut doc, "Book", json!({ "name": "tags", "type": "[String!]" }));

    let v = violation(compile(doc));
    assert_eq!(v.location, "Book.tags");
}

/// Nested lists are rejected even of objects.
#[test]
fn test_nested_list_rejected() {
    let mut doc = fixture();
    push_field(&mut doc, "Shelf", json!({ "name": "stacks", "type": "[[Book]]" }));

    let v = violation(compile(doc));
    assert_eq!(v.location, "Shelf.stacks");
}

/// Fetch roots take exactly `id: ID!`.
#[test]
fn test_query_argument_shape() {
    let mut doc = fixture();
    field_mut(&mut doc, "Query", "author")["args"] = json!([{ "name": "id", "type": "ID" }]);

    let v = violation(compile(doc));
    assert_eq!(v.location, "Query.author");
}

// =============================================================================
// Insert Input Tests
// =============================================================================

/// Input fields must carry the column's input type exactly.
#[test]
fn test_input_nullability_mismatch() {
    let mut doc = fixture();
    field_mut(&mut doc, "BookInput", "title")["type"] = json!("String");

    let v = violation(compile(doc));
    assert_eq!(v.location, "BookInput.title");
    assert_eq!(v.expected, "String!");
}

/// Reference columns take ids, not objects.
#[test]
fn test_input_reference_must_be_id() {
    let mut doc = fixture();
    field_mut(&mut doc, "BookInput", "author")["type"] = json!("String!");

    let v = violation(compile(doc));
    assert_eq!(v.location, "BookInput.author");
    assert_eq!(v.expected, "ID!");
}

/// Every data column needs an input field.
#[test]
fn test_input_missing_column() {
    let mut doc = fixture();
    remove_field(&mut doc, "BookInput", "genre");

    let v = violation(compile(doc));
    assert_eq!(v.location, "BookInput.genre");
}

/// Input fields with no column are rejected.
#[test]
fn test_input_extra_field() {
    let mut doc = fixture();
    push_field(&mut doc, "BookInput", json!({ "name": "isbn", "type": "String" }));

    let v = violation(compile(doc));
    assert_eq!(v.location, "BookInput.isbn");
}

/// The data argument must be a non-null input object.
#[test]
fn test_insert_argument_must_be_non_null() {
    let mut doc = fixture();
    field_mut(&mut doc, "Mutation", "insertAuthor")["args"] =
        json!([{ "name": "data", "type": "AuthorInput" }]);

    let v = violation(compile(doc));
    assert_eq!(v.expected, "a non-null input object");
}

// =============================================================================
// Directive Tests
// =============================================================================

/// A mutation field with no write directive is rejected.
#[test]
fn test_missing_directive() {
    let mut doc = fixture();
    field_mut(&mut doc, "Mutation", "deleteBook")["directives"] = json!([]);

    let v = violation(compile(doc));
    assert_eq!(v.location, "Mutation.deleteBook");
    assert_eq!(v.actual, "none");
}

/// A mutation field with two write directives is rejected.
#[test]
fn test_conflicting_directives() {
    let mut doc = fixture();
    field_mut(&mut doc, "Mutation", "deleteBook")["directives"] = json!([
        { "name": "delete", "arguments": { "table": "Book" } },
        { "name": "insert", "arguments": { "table": "Book" } }
    ]);

    let v = violation(compile(doc));
    assert_eq!(v.location, "Mutation.deleteBook");
}

/// The directive's table must name a declared type.
#[test]
fn test_directive_unknown_table() {
    let mut doc = fixture();
    field_mut(&mut doc, "Mutation", "deleteBook")["directives"] =
        json!([{ "name": "delete", "arguments": { "table": "Magazine" } }]);

    let v = violation(compile(doc));
    assert_eq!(v.location, "Mutation.deleteBook");
    assert!(v.actual.contains("Magazine"));
}

/// Inserts return `Success!`; deletes return nullable `Success`.
#[test]
fn test_return_nullability() {
    let mut doc = fixture();
    field_mut(&mut doc, "Mutation", "insertAuthor")["type"] = json!("Success");
    let v = violation(compile(doc));
    assert_eq!(v.location, "Mutation.insertAuthor");
    assert_eq!(v.expected, "Success!");

    let mut doc = fixture();
    field_mut(&mut doc, "Mutation", "deleteAuthor")["type"] = json!("Success!");
    let v = violation(compile(doc));
    assert_eq!(v.location, "Mutation.deleteAuthor");
    assert_eq!(v.expected, "Success");
}

/// The marker type must expose a versionstamp.
#[test]
fn test_success_needs_versionstamp() {
    let mut doc = fixture();
    type_mut(&mut doc, "Success")["fields"] = json!([{ "name": "ok", "type": "Boolean" }]);

    let v = violation(compile(doc));
    assert_eq!(v.location, "Success.versionstamp");
}

/// Transactions cannot nest.
#[test]
fn test_nested_transaction_rejected() {
    let mut doc = fixture();
    push_field(
        &mut doc,
        "Catalog",
        json!({ "name": "inner", "type": "Catalog", "directives": [{ "name": "transaction" }] }),
    );

    let v = violation(compile(doc));
    assert_eq!(v.location, "Catalog.inner");
}

/// Sub-mutations follow the same rules as root mutations.
#[test]
fn test_transaction_sub_checked() {
    let mut doc = fixture();
    field_mut(&mut doc, "Catalog", "removeAuthors")["args"] = json!([]);

    let v = violation(compile(doc));
    assert_eq!(v.location, "Catalog.removeAuthors");
}

// =============================================================================
// Loader Tests
// =============================================================================

/// Unknown type references are caught before compiling.
#[test]
fn test_loader_unknown_type() {
    let mut doc = fixture();
    field_mut(&mut doc, "Book", "genre")["type"] = json!("Mood");

    let err = SchemaLoader::from_value(doc).unwrap_err();
    assert_eq!(err.code(), "KV_INVALID_SCHEMA");
}

/// Types may be declared only once.
#[test]
fn test_loader_duplicate_type() {
    let mut doc = fixture();
    doc["types"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "name": "Genre", "kind": "enum" }));

    match SchemaLoader::from_value(doc) {
        Err(Error::InvalidSchema(v)) => assert_eq!(v.location, "Genre"),
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}
