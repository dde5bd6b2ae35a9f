//! Bounded optimistic retry
//!
//! The monotonic-id insert reads the table's last key, derives the next id
//! and commits conditioned on that read. When a concurrent writer wins the
//! race the commit reports a conflict and the whole read-then-commit cycle
//! is repeated, at most `max_attempts` times.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::observability::{log_event_with_fields, Event};

/// Default bound on insert attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Outcome of one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    /// Committed; stop retrying
    Done(T),
    /// A check failed; state must be re-read
    Conflict,
}

/// Retry bound for optimistic writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Run `attempt` until it reports `Done`, an error, or the bound is hit.
    ///
    /// The closure receives the 1-based attempt number. At least one
    /// attempt is always made.
    pub async fn run<T, F, Fut>(&self, table: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Attempt<T>>>,
    {
        let limit = self.max_attempts.max(1);
        for n in 1..=limit {
            match attempt(n).await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Conflict if n < limit => {
                    let n = n.to_string();
                    log_event_with_fields(
                        Event::InsertConflictRetry,
                        &[("attempt", n.as_str()), ("table", table)],
                    );
                }
                Attempt::Conflict => {}
            }
        }

        let attempts = limit.to_string();
        log_event_with_fields(
            Event::InsertRetriesExhausted,
            &[("attempts", attempts.as_str()), ("table", table)],
        );
        Err(Error::ConcurrencyExhausted {
            table: table.to_string(),
            attempts: limit,
        })
    }
}
