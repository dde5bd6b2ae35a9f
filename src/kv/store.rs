//! Store contract
//!
//! The compiled operations only ever talk to a store through `KvStore`:
//! point reads, batched reads, ordered prefix scans and a single atomic
//! check-and-commit primitive. Calls are async; they are the only places
//! where an operation suspends.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::StoreResult;
use super::key::Key;
use super::versionstamp::Versionstamp;

/// Future returned by every store call
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// A stored entry with the versionstamp of the commit that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Key,
    pub value: Value,
    pub versionstamp: Versionstamp,
}

/// Range selection for `KvStore::list`.
///
/// Selects every key that strictly extends `prefix`, in key order (or
/// reverse key order), up to `limit` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSelector {
    pub prefix: Key,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl ListSelector {
    pub fn prefix(prefix: Key) -> Self {
        Self {
            prefix,
            reverse: false,
            limit: None,
        }
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Expected state of a key at commit time.
///
/// `versionstamp: None` means the key must be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub key: Key,
    pub versionstamp: Option<Versionstamp>,
}

/// A write applied by a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set(Key, Value),
    Delete(Key),
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Mutation::Set(key, _) | Mutation::Delete(key) => key,
        }
    }
}

/// An atomic unit of checks and writes.
///
/// The store evaluates every check against one consistent state before any
/// write is applied. If a single check fails nothing is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicOperation {
    checks: Vec<Check>,
    mutations: Vec<Mutation>,
}

impl AtomicOperation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to currently carry `versionstamp` (or be absent for `None`).
    pub fn check(&mut self, key: Key, versionstamp: Option<Versionstamp>) -> &mut Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    pub fn set(&mut self, key: Key, value: Value) -> &mut Self {
        self.mutations.push(Mutation::Set(key, value));
        self
    }

    pub fn delete(&mut self, key: Key) -> &mut Self {
        self.mutations.push(Mutation::Delete(key));
        self
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty() && self.mutations.is_empty()
    }
}

/// Outcome of `KvStore::commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// Every check passed and every write was applied.
    Committed(Versionstamp),
    /// At least one check failed; nothing was written.
    Conflict,
}

impl CommitResult {
    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            CommitResult::Committed(vs) => Some(*vs),
            CommitResult::Conflict => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed(_))
    }
}

/// Ordered key-value store with atomic check-and-commit.
pub trait KvStore: Send + Sync {
    /// Read a single key.
    fn get<'a>(&'a self, key: &'a Key) -> StoreFuture<'a, Option<Entry>>;

    /// Read many keys in one round trip. Output order matches `keys`.
    fn get_many<'a>(&'a self, keys: &'a [Key]) -> StoreFuture<'a, Vec<Option<Entry>>>;

    /// Scan the keys extending a prefix.
    fn list<'a>(&'a self, selector: &'a ListSelector) -> StoreFuture<'a, Vec<Entry>>;

    /// Evaluate checks and apply writes atomically.
    fn commit(&self, op: AtomicOperation) -> StoreFuture<'_, CommitResult>;
}
