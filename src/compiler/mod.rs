//! Schema-to-operation compiler
//!
//! Columns are classified once (`column`), tables are compiled once and
//! shared (`table`), and the query and mutation roots are turned into
//! invocable operations over those tables (`query`, `mutation`).

mod column;
mod mutation;
mod query;
mod table;

pub use column::{classify, ColumnDescriptor, ColumnKind};
pub use mutation::{
    DeleteOperation, InsertOperation, MutationOperation, MutationOperationBuilder, SubMutation,
    TransactionOperation, DELETE_DIRECTIVE, INSERT_DIRECTIVE, SUCCESS_TYPE, TRANSACTION_DIRECTIVE,
};
pub use query::{FetchOperation, FieldOperation, QueryOperationBuilder, TableFields};
pub(crate) use query::read_row;
pub use table::{TableCompiler, TableDescriptor};
