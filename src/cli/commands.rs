//! CLI command implementations
//!
//! Both commands load the configuration, then the schema, then compile it.
//! A schema that fails to compile stops the process before any request is
//! read.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::compiler::ColumnKind;
use crate::engine::{Engine, Request};
use crate::kv::{KvStore, MemoryStore};
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::registry::Registry;
use crate::schema::SchemaLoader;
use crate::txn::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_requests, write_error, write_response};

/// Code reported for lines that are not a valid request
pub const INVALID_REQUEST: &str = "KV_INVALID_REQUEST";

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema document (required)
    pub schema_path: String,

    /// Store snapshot; loaded before and written after `exec`
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Attempts per monotonic insert before giving up (default 10)
    #[serde(default = "default_max_insert_attempts")]
    pub max_insert_attempts: u32,

    /// Minimum log severity (default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_max_insert_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.schema_path.trim().is_empty() {
            return Err(CliError::config_error("schema_path must not be empty"));
        }

        if self.max_insert_attempts == 0 {
            return Err(CliError::config_error("max_insert_attempts must be > 0"));
        }

        self.severity()?;

        Ok(())
    }

    pub fn severity(&self) -> CliResult<Severity> {
        self.log_level.parse::<Severity>().map_err(CliError::config_error)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_insert_attempts)
    }

    pub fn schema_path(&self) -> PathBuf {
        self.base_dir.join(&self.schema_path)
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.snapshot_path.as_ref().map(|p| self.base_dir.join(p))
    }
}

/// Parse arguments and run the command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Check { config } => check(&config, &mut io::stdout()),
        Command::Exec { config } => {
            let stdin = io::stdin();
            exec(&config, stdin.lock(), &mut io::stdout())
        }
    }
}

/// Compile the schema and print a summary of tables and operations
pub fn check<W: Write>(config_path: &Path, out: &mut W) -> CliResult<()> {
    let config = boot_config(config_path)?;
    let registry = compile_schema(&config)?;
    write_response(out, summary(&registry))
}

/// Serve JSON-lines requests until `input` ends
///
/// The snapshot, when configured, is loaded first and written back after
/// the last request.
pub fn exec<R: BufRead, W: Write>(config_path: &Path, input: R, out: &mut W) -> CliResult<()> {
    let config = boot_config(config_path)?;
    let registry = Arc::new(compile_schema(&config)?);

    let store = Arc::new(open_store(&config)?);
    let shared: Arc<dyn KvStore> = store.clone();
    let engine = Engine::new(registry, shared).with_retry(config.retry_policy());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::runtime_error(e.to_string()))?;
    runtime.block_on(serve(&engine, input, out))?;

    if let Some(path) = config.snapshot_path() {
        store.save(&path).map_err(|e| CliError::snapshot_error(&e))?;
    }
    Ok(())
}

/// Execute every request line, answering each on its own line.
///
/// Failed requests are answered with an error line and do not stop the
/// loop. Returns the number of requests handled.
pub async fn serve<R: BufRead, W: Write>(engine: &Engine, input: R, out: &mut W) -> CliResult<usize> {
    let mut handled = 0;
    for line in read_requests(input) {
        let line = line?;
        handled += 1;

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                write_error(out, INVALID_REQUEST, &e.to_string())?;
                continue;
            }
        };

        match engine.execute(&request).await {
            Ok(output) => write_response(out, output.to_json())?,
            Err(e) => {
                log_event_with_fields(
                    Event::RequestFailed,
                    &[("code", e.code()), ("op", request.kind())],
                );
                write_error(out, e.code(), &e.to_string())?;
            }
        }
    }
    Ok(handled)
}

fn boot_config(config_path: &Path) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    Logger::set_min_severity(config.severity()?);

    let path = config_path.display().to_string();
    log_event_with_fields(Event::ConfigLoaded, &[("path", path.as_str())]);
    Ok(config)
}

fn compile_schema(config: &Config) -> CliResult<Registry> {
    let path = config.schema_path();
    SchemaLoader::load_file(&path)
        .and_then(|schema| Registry::compile(&schema))
        .map_err(|e| {
            let path = path.display().to_string();
            let reason = e.to_string();
            log_event_with_fields(
                Event::SchemaRejected,
                &[
                    ("code", e.code()),
                    ("path", path.as_str()),
                    ("reason", reason.as_str()),
                ],
            );
            CliError::schema_error(&e)
        })
}

fn open_store(config: &Config) -> CliResult<MemoryStore> {
    match config.snapshot_path() {
        Some(path) if path.exists() => {
            MemoryStore::load(&path).map_err(|e| CliError::snapshot_error(&e))
        }
        _ => Ok(MemoryStore::new()),
    }
}

fn summary(registry: &Registry) -> Value {
    let tables: Vec<Value> = registry
        .tables()
        .map(|table| {
            let columns: Vec<Value> = table
                .columns()
                .iter()
                .map(|c| {
                    let mut column = Map::new();
                    column.insert("name".into(), json!(c.name));
                    column.insert("kind".into(), json!(c.kind.kind_name()));
                    column.insert("nullable".into(), json!(c.nullable));
                    if let Some(target) = c.kind.target() {
                        column.insert("target".into(), json!(target));
                    }
                    if let ColumnKind::ReferenceList {
                        element_nullable, ..
                    } = c.kind
                    {
                        column.insert("element_nullable".into(), json!(element_nullable));
                    }
                    Value::Object(column)
                })
                .collect();
            json!({ "name": table.name(), "columns": columns })
        })
        .collect();

    let queries: Map<String, Value> = registry
        .queries()
        .map(|(name, op)| (name.clone(), json!(op.table().name())))
        .collect();
    let mutations: Map<String, Value> = registry
        .mutations()
        .map(|(name, op)| (name.clone(), json!(op.kind_name())))
        .collect();

    json!({
        "tables": tables,
        "queries": queries,
        "mutations": mutations,
    })
}
