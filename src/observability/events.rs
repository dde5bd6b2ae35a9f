//! Observable events
//!
//! Events are explicit and typed; each carries its own severity.

use std::fmt;

use super::logger::Severity;

/// Observable events in kvschema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Startup
    /// Configuration loaded
    ConfigLoaded,
    /// One table descriptor built
    TableCompiled,
    /// Whole schema compiled into a registry
    SchemaCompiled,
    /// Schema rejected at startup
    SchemaRejected,

    // Writes
    /// Monotonic insert lost a race and will rescan
    InsertConflictRetry,
    /// Monotonic insert gave up
    InsertRetriesExhausted,
    /// Composite transaction aborted by a failed check
    TransactionConflict,

    // Store
    /// Snapshot loaded from disk
    SnapshotLoaded,
    /// Snapshot written to disk
    SnapshotSaved,

    // Requests
    /// A request failed
    RequestFailed,
}

impl Event {
    /// Returns the event name as it appears in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::TableCompiled => "TABLE_COMPILED",
            Event::SchemaCompiled => "SCHEMA_COMPILED",
            Event::SchemaRejected => "SCHEMA_REJECTED",
            Event::InsertConflictRetry => "INSERT_CONFLICT_RETRY",
            Event::InsertRetriesExhausted => "INSERT_RETRIES_EXHAUSTED",
            Event::TransactionConflict => "TRANSACTION_CONFLICT",
            Event::SnapshotLoaded => "SNAPSHOT_LOADED",
            Event::SnapshotSaved => "SNAPSHOT_SAVED",
            Event::RequestFailed => "REQUEST_FAILED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Event::TableCompiled | Event::InsertConflictRetry => Severity::Trace,
            Event::InsertRetriesExhausted | Event::TransactionConflict => Severity::Warn,
            Event::RequestFailed => Severity::Error,
            Event::SchemaRejected => Severity::Fatal,
            _ => Severity::Info,
        }
    }

    /// Returns whether this event means the process cannot continue
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
