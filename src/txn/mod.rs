//! Write protocol
//!
//! Row writes are staged checks-first into one atomic store operation
//! (`executor`); the monotonic-id insert wraps that in a bounded retry
//! (`retry`).

mod executor;
mod retry;

pub use executor::{DeleteCondition, RowDelete, RowInsert, RowWrite, TransactionExecutor, WriteBatch};
pub use retry::{Attempt, RetryPolicy, DEFAULT_MAX_ATTEMPTS};
