//! Key-value store layer
//!
//! - `Key` / `KeyPart` - ordered tuple keys and the per-column row layout
//! - `Versionstamp` - commit version assigned by the store
//! - `KvStore` - the store contract the compiled operations run against
//! - `MemoryStore` - in-process implementation with JSON snapshots
//! - `checksum` - CRC32 sealing of snapshot files

mod checksum;
mod errors;
mod key;
mod memory;
mod store;
mod versionstamp;

pub use errors::{StoreError, StoreResult};
pub use key::{Key, KeyPart, ID_COLUMN};
pub use memory::MemoryStore;
pub use store::{
    AtomicOperation, Check, CommitResult, Entry, KvStore, ListSelector, Mutation, StoreFuture,
};
pub use versionstamp::{ParseVersionstampError, Versionstamp};
