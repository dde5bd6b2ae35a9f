//! CLI module for kvschema
//!
//! Provides command-line interface for:
//! - check: Compile the schema and print a summary
//! - exec: Serve JSON-lines requests from stdin

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, exec, run, run_command, serve, Config, INVALID_REQUEST};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_requests, write_error, write_response};
