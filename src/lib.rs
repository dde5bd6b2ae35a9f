//! kvschema - compiles a table schema into data-access operations over an
//! ordered key-value store
//!
//! A schema declares tables (object types with an `id: ID!` column),
//! references between them, and annotated root mutations. Compilation
//! produces an immutable `Registry` of operations; an `Engine` runs them
//! against any `KvStore`, using atomic check-and-commit for writes.

pub mod cli;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod kv;
pub mod observability;
pub mod output;
pub mod registry;
pub mod row;
pub mod schema;
pub mod txn;

pub use engine::{Engine, Request};
pub use error::{Corruption, Error, Result, SchemaViolation};
pub use kv::{KvStore, MemoryStore};
pub use output::{Output, Success};
pub use registry::Registry;
pub use row::{Row, RowId};
pub use schema::{Schema, SchemaLoader};
