//! CLI-level failures
//!
//! A `CliError` ends the process. Failed requests inside `exec` are
//! answered on stdout and never become one.

use std::fmt;
use std::io;

use crate::error::Error;
use crate::kv::StoreError;

/// What stopped the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Config file unreadable or invalid
    ConfigError,
    /// stdin/stdout failure
    IoError,
    /// Schema unreadable or rejected by the compiler
    SchemaError,
    /// Snapshot unreadable, corrupted or unwritable
    SnapshotError,
    /// Async runtime failed to start
    RuntimeError,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "KV_CLI_CONFIG_ERROR",
            Self::IoError => "KV_CLI_IO_ERROR",
            Self::SchemaError => "KV_CLI_SCHEMA_ERROR",
            Self::SnapshotError => "KV_CLI_SNAPSHOT_ERROR",
            Self::RuntimeError => "KV_CLI_RUNTIME_ERROR",
        }
    }

    /// Process exit status; distinct per failure so scripts can branch on it.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError => 2,
            Self::SchemaError => 3,
            Self::SnapshotError => 4,
            Self::IoError => 5,
            Self::RuntimeError => 70,
        }
    }
}

impl fmt::Display for CliErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Wraps a load or compile failure; the library code stays visible.
    pub fn schema_error(e: &Error) -> Self {
        Self::new(CliErrorCode::SchemaError, format!("{}: {}", e.code(), e))
    }

    pub fn snapshot_error(e: &StoreError) -> Self {
        Self::new(CliErrorCode::SnapshotError, e.to_string())
    }

    pub fn runtime_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::RuntimeError, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

/// Only raised while writing responses
impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("cannot encode response: {}", e))
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_leads_with_code() {
        let e = CliError::config_error("schema_path must not be empty");
        assert_eq!(
            e.to_string(),
            "KV_CLI_CONFIG_ERROR: schema_path must not be empty"
        );
    }

    #[test]
    fn test_schema_error_keeps_library_code() {
        let e = CliError::schema_error(&Error::invalid_input("x"));
        assert_eq!(e.code(), CliErrorCode::SchemaError);
        assert!(e.message().starts_with("KV_INVALID_INPUT"));
    }

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let codes = [
            CliErrorCode::ConfigError,
            CliErrorCode::IoError,
            CliErrorCode::SchemaError,
            CliErrorCode::SnapshotError,
            CliErrorCode::RuntimeError,
        ];
        let mut exits: Vec<i32> = codes.iter().map(CliErrorCode::exit_code).collect();
        assert!(exits.iter().all(|c| *c != 0));
        exits.sort_unstable();
        exits.dedup();
        assert_eq!(exits.len(), codes.len());
    }

    #[test]
    fn test_snapshot_error_carries_path() {
        let e = CliError::snapshot_error(&StoreError::SnapshotMalformed {
            path: "data.json".into(),
            reason: "checksum mismatch".into(),
        });
        assert_eq!(e.exit_code(), 4);
        assert!(e.message().contains("data.json"));
    }
}
