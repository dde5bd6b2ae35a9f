//! # Store Errors
//!
//! Faults raised by a key-value store. A failed version check is NOT an
//! error; it is reported as `CommitResult::Conflict`.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level faults. Fatal for the call that raised them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal state of the store could not be accessed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Snapshot file could not be read or written
    #[error("Snapshot I/O failed for '{path}': {source}")]
    SnapshotIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot file content is not a valid snapshot
    #[error("Snapshot '{path}' is malformed: {reason}")]
    SnapshotMalformed { path: String, reason: String },
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
