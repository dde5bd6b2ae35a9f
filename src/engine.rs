//! Store-bound execution facade
//!
//! `Engine` pairs a compiled `Registry` with a store and a retry policy and
//! dispatches requests by operation name. It is cheap to clone and safe to
//! share across tasks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compiler::read_row;
use crate::error::{Error, Result};
use crate::kv::KvStore;
use crate::output::Output;
use crate::registry::Registry;
use crate::row::{Row, RowId};
use crate::txn::RetryPolicy;

/// A request as accepted on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Invoke a root query field
    Query {
        name: String,
        #[serde(default)]
        args: Value,
    },
    /// Invoke a root mutation field
    Mutation {
        name: String,
        #[serde(default)]
        args: Value,
    },
    /// Fetch a row and resolve one of its columns
    Resolve {
        table: String,
        id: String,
        column: String,
    },
}

impl Request {
    /// Operation kind for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Query { .. } => "query",
            Request::Mutation { .. } => "mutation",
            Request::Resolve { .. } => "resolve",
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    store: Arc<dyn KvStore>,
    retry: RetryPolicy,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn KvStore>) -> Self {
        Self {
            registry,
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Invoke the root query field `name`.
    pub async fn query(&self, name: &str, args: &Value) -> Result<Output> {
        let op = self
            .registry
            .query(name)
            .ok_or_else(|| Error::invalid_input(format!("unknown query '{}'", name)))?;
        op.invoke(self.store.as_ref(), args).await
    }

    /// Invoke the root mutation field `name`.
    pub async fn mutate(&self, name: &str, args: &Value) -> Result<Output> {
        let op = self
            .registry
            .mutation(name)
            .ok_or_else(|| Error::invalid_input(format!("unknown mutation '{}'", name)))?;
        op.invoke(self.store.as_ref(), &self.retry, args).await
    }

    /// Resolve `column` of a row previously fetched from `table`.
    pub async fn resolve(&self, table: &str, column: &str, row: &Row) -> Result<Output> {
        if row.table() != table {
            return Err(Error::invalid_input(format!(
                "row belongs to '{}', not '{}'",
                row.table(),
                table
            )));
        }
        let op = self.registry.field(table, column).ok_or_else(|| {
            Error::invalid_input(format!("unknown field '{}.{}'", table, column))
        })?;
        op.invoke(self.store.as_ref(), row).await
    }

    /// Execute a wire request.
    pub async fn execute(&self, request: &Request) -> Result<Output> {
        match request {
            Request::Query { name, args } => self.query(name, args).await,
            Request::Mutation { name, args } => self.mutate(name, args).await,
            Request::Resolve { table, id, column } => {
                let descriptor = self
                    .registry
                    .table(table)
                    .ok_or_else(|| Error::invalid_input(format!("unknown table '{}'", table)))?;
                let id = RowId::parse(id)?;
                match read_row(self.store.as_ref(), descriptor, id).await? {
                    Some(row) => self.resolve(table, column, &row).await,
                    None => Ok(Output::Null),
                }
            }
        }
    }
}
