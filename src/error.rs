//! Error taxonomy
//!
//! Error codes:
//! - KV_INVALID_SCHEMA (compile time, aborts startup)
//! - KV_INVALID_INPUT (caller mistake, per request)
//! - KV_DATABASE_CORRUPTION (stored data breaks a schema guarantee)
//! - KV_CONCURRENCY_EXHAUSTED (optimistic retries used up, retryable)
//! - KV_STORE_FAILURE (store fault, fatal for the call)
//!
//! A transaction whose checks fail is not an error; it yields a null result.

use std::fmt;

use thiserror::Error;

use crate::kv::StoreError;
use crate::row::RowId;

/// Result type for compilation and operations
pub type Result<T> = std::result::Result<T, Error>;

/// Where a schema breaks a structural rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Type or field path (e.g., "Book.author")
    pub location: String,
    /// Expected shape
    pub expected: String,
    /// Shape actually found
    pub actual: String,
}

impl SchemaViolation {
    pub fn new(
        location: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn missing(location: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::new(location, expected, "missing")
    }

    pub fn unknown_type(location: impl Into<String>, name: &str) -> Self {
        Self::new(location, "a declared type", format!("unknown type '{}'", name))
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}': expected {}, got {}",
            self.location, self.expected, self.actual
        )
    }
}

/// Ways stored data can contradict the schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    /// A non-null column has no stored value
    MissingValue { table: String, id: RowId, column: String },
    /// Referenced rows do not exist; every missing id is listed
    DanglingReferences {
        table: String,
        column: String,
        target: String,
        ids: Vec<RowId>,
    },
    /// A list reference with non-null elements is stored empty
    EmptyReferenceList { table: String, id: RowId, column: String },
    /// A stored value does not have the shape its column requires
    MalformedValue {
        table: String,
        column: String,
        reason: String,
    },
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corruption::MissingValue { table, id, column } => {
                write!(f, "{}({}).{} is required but not stored", table, id, column)
            }
            Corruption::DanglingReferences {
                table,
                column,
                target,
                ids,
            } => {
                let ids: Vec<String> = ids.iter().map(RowId::to_string).collect();
                write!(
                    f,
                    "{}.{} references missing {} rows [{}]",
                    table,
                    column,
                    target,
                    ids.join(", ")
                )
            }
            Corruption::EmptyReferenceList { table, id, column } => {
                write!(f, "{}({}).{} requires at least one reference", table, id, column)
            }
            Corruption::MalformedValue {
                table,
                column,
                reason,
            } => write!(f, "{}.{} holds a malformed value: {}", table, column, reason),
        }
    }
}

/// Crate error
#[derive(Debug, Error)]
pub enum Error {
    /// Schema breaks a structural contract. Raised only while compiling.
    #[error("Invalid schema: {0}")]
    InvalidSchema(SchemaViolation),

    /// Caller-supplied arguments break a runtime precondition
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Stored data breaks an invariant the schema guarantees
    #[error("Database corruption: {0}")]
    DatabaseCorruption(Corruption),

    /// Optimistic retry bound exceeded
    #[error("Insert into '{table}' conflicted on all {attempts} attempts")]
    ConcurrencyExhausted { table: String, attempts: u32 },

    /// Store fault, propagated unchanged
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    pub fn invalid_schema(violation: SchemaViolation) -> Self {
        Self::InvalidSchema(violation)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn corruption(corruption: Corruption) -> Self {
        Self::DatabaseCorruption(corruption)
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidSchema(_) => "KV_INVALID_SCHEMA",
            Error::InvalidInput(_) => "KV_INVALID_INPUT",
            Error::DatabaseCorruption(_) => "KV_DATABASE_CORRUPTION",
            Error::ConcurrencyExhausted { .. } => "KV_CONCURRENCY_EXHAUSTED",
            Error::Store(_) => "KV_STORE_FAILURE",
        }
    }

    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrencyExhausted { .. })
    }
}
