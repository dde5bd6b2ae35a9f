//! CLI argument definitions using clap
//!
//! Commands:
//! - kvschema check --config <path>
//! - kvschema exec --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kvschema - compile a table schema into key-value store operations
#[derive(Parser, Debug)]
#[command(name = "kvschema")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile the schema and print what it defines
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./kvschema.json")]
        config: PathBuf,
    },

    /// Execute JSON-lines requests from stdin
    Exec {
        /// Path to configuration file
        #[arg(long, default_value = "./kvschema.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exec_with_config() {
        let cli = Cli::try_parse_from(["kvschema", "exec", "--config", "/tmp/k.json"]).unwrap();
        match cli.command {
            Command::Exec { config } => assert_eq!(config, PathBuf::from("/tmp/k.json")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_config_defaults() {
        let cli = Cli::try_parse_from(["kvschema", "check"]).unwrap();
        match cli.command {
            Command::Check { config } => assert_eq!(config, PathBuf::from("./kvschema.json")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
