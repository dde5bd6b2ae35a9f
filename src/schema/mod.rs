//! Schema type graph and loader
//!
//! The compiler consumes a schema as an immutable type graph:
//! - Named types with a kind (scalar, enum, object, input object, ...)
//! - Ordered fields with wrapped type references
//! - Field arguments and directives binding mutations to tables
//!
//! Schemas arrive as JSON documents; see `SchemaLoader`.

mod loader;
mod types;

pub use loader::{Schema, SchemaLoader};
pub use types::{
    ArgumentDef, Directive, FieldDef, SchemaDocument, TypeDef, TypeKind, TypeRef,
    BUILTIN_SCALARS, ID_SCALAR,
};
