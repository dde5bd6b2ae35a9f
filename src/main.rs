//! kvschema CLI entry point
//!
//! Failures are printed to stderr; the exit status names the failure kind.

use kvschema::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
