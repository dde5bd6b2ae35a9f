//! In-memory store
//!
//! Reference implementation of `KvStore` backed by a `BTreeMap`. Commits
//! take the write lock for their whole duration, so checks and writes of one
//! commit observe a single state. Every call yields to the runtime once
//! before touching state, standing in for the network round trip of a
//! remote store.
//!
//! The whole keyspace can be written to and restored from a JSON snapshot
//! sealed with a CRC32 header.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::checksum;
use super::errors::{StoreError, StoreResult};
use super::key::{Key, KeyPart};
use super::store::{
    AtomicOperation, CommitResult, Entry, KvStore, ListSelector, Mutation, StoreFuture,
};
use super::versionstamp::Versionstamp;
use crate::observability::{log_event_with_fields, Event};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Value,
    versionstamp: Versionstamp,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<Key, StoredValue>,
    /// Versionstamp of the latest commit, 0 before the first one.
    last_commit: u64,
}

/// On-disk form of a store.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    last_commit: u64,
    entries: Vec<Entry>,
}

/// In-memory ordered key-value store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read_state()?.entries.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.read_state()?.entries.is_empty())
    }

    /// Versionstamp of the latest commit, if any commit happened.
    pub fn last_versionstamp(&self) -> StoreResult<Option<Versionstamp>> {
        let state = self.read_state()?;
        Ok((state.last_commit > 0).then(|| Versionstamp::new(state.last_commit)))
    }

    /// Restore a store from a snapshot file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| StoreError::SnapshotIo {
            path: path.display().to_string(),
            source: e,
        })?;

        let body = checksum::unseal(&content).map_err(|reason| StoreError::SnapshotMalformed {
            path: path.display().to_string(),
            reason,
        })?;
        let snapshot: Snapshot =
            serde_json::from_str(body).map_err(|e| StoreError::SnapshotMalformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut entries = BTreeMap::new();
        for entry in snapshot.entries {
            if entry.versionstamp.value() > snapshot.last_commit {
                return Err(StoreError::SnapshotMalformed {
                    path: path.display().to_string(),
                    reason: format!(
                        "entry {} is newer than the last commit {}",
                        entry.key,
                        Versionstamp::new(snapshot.last_commit)
                    ),
                });
            }
            entries.insert(
                entry.key,
                StoredValue {
                    value: entry.value,
                    versionstamp: entry.versionstamp,
                },
            );
        }

        let count = entries.len().to_string();
        let path_str = path.display().to_string();
        log_event_with_fields(
            Event::SnapshotLoaded,
            &[("entries", count.as_str()), ("path", path_str.as_str())],
        );

        Ok(Self {
            state: RwLock::new(State {
                entries,
                last_commit: snapshot.last_commit,
            }),
        })
    }

    /// Write the whole keyspace to a snapshot file.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let snapshot = {
            let state = self.read_state()?;
            Snapshot {
                last_commit: state.last_commit,
                entries: state
                    .entries
                    .iter()
                    .map(|(k, v)| to_entry(k, v))
                    .collect(),
            }
        };

        let content =
            serde_json::to_string_pretty(&snapshot).map_err(|e| StoreError::SnapshotMalformed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        fs::write(path, checksum::seal(&content)).map_err(|e| StoreError::SnapshotIo {
            path: path.display().to_string(),
            source: e,
        })?;

        let count = snapshot.entries.len().to_string();
        let path_str = path.display().to_string();
        log_event_with_fields(
            Event::SnapshotSaved,
            &[("entries", count.as_str()), ("path", path_str.as_str())],
        );
        Ok(())
    }

    fn read_state(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| StoreError::unavailable(e.to_string()))
    }

    fn write_state(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| StoreError::unavailable(e.to_string()))
    }

    fn get_now(&self, key: &Key) -> StoreResult<Option<Entry>> {
        let state = self.read_state()?;
        Ok(state.entries.get(key).map(|v| to_entry(key, v)))
    }

    fn get_many_now(&self, keys: &[Key]) -> StoreResult<Vec<Option<Entry>>> {
        let state = self.read_state()?;
        Ok(keys
            .iter()
            .map(|key| state.entries.get(key).map(|v| to_entry(key, v)))
            .collect())
    }

    fn list_now(&self, selector: &ListSelector) -> StoreResult<Vec<Entry>> {
        let state = self.read_state()?;
        let lower = Bound::Excluded(selector.prefix.clone());
        let upper = match successor(&selector.prefix) {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let limit = selector.limit.unwrap_or(usize::MAX);

        let range = state.entries.range((lower, upper));
        let entries = if selector.reverse {
            range.rev().take(limit).map(|(k, v)| to_entry(k, v)).collect()
        } else {
            range.take(limit).map(|(k, v)| to_entry(k, v)).collect()
        };
        Ok(entries)
    }

    fn commit_now(&self, op: AtomicOperation) -> StoreResult<CommitResult> {
        let mut state = self.write_state()?;

        for check in op.checks() {
            let current = state.entries.get(&check.key).map(|v| v.versionstamp);
            if current != check.versionstamp {
                return Ok(CommitResult::Conflict);
            }
        }

        let versionstamp = Versionstamp::new(state.last_commit).next();
        state.last_commit = versionstamp.value();

        for mutation in op.mutations() {
            match mutation {
                Mutation::Set(key, value) => {
                    state.entries.insert(
                        key.clone(),
                        StoredValue {
                            value: value.clone(),
                            versionstamp,
                        },
                    );
                }
                Mutation::Delete(key) => {
                    state.entries.remove(key);
                }
            }
        }

        Ok(CommitResult::Committed(versionstamp))
    }
}

impl KvStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a Key) -> StoreFuture<'a, Option<Entry>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.get_now(key)
        })
    }

    fn get_many<'a>(&'a self, keys: &'a [Key]) -> StoreFuture<'a, Vec<Option<Entry>>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.get_many_now(keys)
        })
    }

    fn list<'a>(&'a self, selector: &'a ListSelector) -> StoreFuture<'a, Vec<Entry>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.list_now(selector)
        })
    }

    fn commit(&self, op: AtomicOperation) -> StoreFuture<'_, CommitResult> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.commit_now(op)
        })
    }
}

fn to_entry(key: &Key, stored: &StoredValue) -> Entry {
    Entry {
        key: key.clone(),
        value: stored.value.clone(),
        versionstamp: stored.versionstamp,
    }
}

/// Smallest key greater than every key extending `prefix`.
///
/// Returns `None` for the empty prefix, which covers the whole keyspace.
fn successor(prefix: &Key) -> Option<Key> {
    let (last, init) = prefix.parts().split_last()?;
    let bumped = match last {
        KeyPart::Int(v) if *v < u64::MAX => KeyPart::Int(v + 1),
        KeyPart::Int(_) => KeyPart::Str(String::new()),
        KeyPart::Str(s) => KeyPart::Str(format!("{}\0", s)),
    };
    let mut parts = init.to_vec();
    parts.push(bumped);
    Some(Key::new(parts))
}
