//! Write Protocol Tests
//!
//! Concurrency and atomicity of the write paths:
//! - Concurrent monotonic inserts never lose an update
//! - Exhausted retries surface as a retryable error
//! - Transactions apply all of their rows or none of them
//! - Transaction deletes require a current versionstamp
//! - A transaction may name each row only once

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use kvschema::kv::{AtomicOperation, Key, KvStore};
use kvschema::txn::RetryPolicy;
use kvschema::{Engine, MemoryStore, Output, Registry, RowId, SchemaLoader};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn registry() -> Arc<Registry> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/library.json");
    let schema = SchemaLoader::load_file(&path).unwrap();
    Arc::new(Registry::compile(&schema).unwrap())
}

fn engine_with(store: Arc<MemoryStore>, attempts: u32) -> Engine {
    Engine::new(registry(), store).with_retry(RetryPolicy::new(attempts))
}

fn author(id: &str, name: &str) -> Value {
    json!({ "id": id, "data": { "name": name } })
}

async fn author_exists(engine: &Engine, id: &str) -> bool {
    !engine
        .query("author", &json!({ "id": id }))
        .await
        .unwrap()
        .is_null()
}

/// Run every future as its own task, returning outputs in input order.
async fn join_all<F>(futures: Vec<F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut set = tokio::task::JoinSet::new();
    for (i, f) in futures.into_iter().enumerate() {
        set.spawn(async move { (i, f.await) });
    }
    let mut out = Vec::new();
    while let Some(joined) = set.join_next().await {
        out.push(joined.unwrap());
    }
    out.sort_by_key(|(i, _)| *i);
    out.into_iter().map(|(_, v)| v).collect()
}

// =============================================================================
// Concurrent Insert Tests
// =============================================================================

/// N racing inserts all succeed with N distinct ids.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inserts_get_distinct_ids() {
    const N: u32 = 16;
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store, N);

    let mut handles = Vec::new();
    for i in 0..N {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let data = json!({ "data": { "name": format!("author-{}", i) } });
            let out = engine.mutate("insertAuthor", &data).await.unwrap();
            out.as_success().unwrap().id.unwrap()
        }));
    }

    let mut ids = BTreeSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }

    assert_eq!(ids.len(), N as usize);
    let expected: BTreeSet<RowId> = (1..=N as u64).filter_map(RowId::new).collect();
    assert_eq!(ids, expected);
}

/// Concurrent inserts on a single-threaded runtime still interleave at
/// every store call and never lose an update.
#[tokio::test]
async fn test_interleaved_inserts_get_distinct_ids() {
    const N: u32 = 8;
    let engine = engine_with(Arc::new(MemoryStore::new()), N);

    let inserts = (0..N).map(|i| {
        let engine = engine.clone();
        async move {
            let data = json!({ "data": { "name": i.to_string() } });
            engine.mutate("insertAuthor", &data).await
        }
    });
    let results = join_all(inserts.collect()).await;

    let ids: BTreeSet<RowId> = results
        .into_iter()
        .map(|r| r.unwrap().as_success().unwrap().id.unwrap())
        .collect();
    assert_eq!(ids.len(), N as usize);
}

/// With a single attempt allowed, losing the race is reported as
/// retryable exhaustion rather than a silent failure.
#[tokio::test]
async fn test_single_attempt_race_reports_exhaustion() {
    const N: u32 = 6;
    let engine = engine_with(Arc::new(MemoryStore::new()), 1);

    let inserts = (0..N).map(|i| {
        let engine = engine.clone();
        async move {
            let data = json!({ "data": { "name": i.to_string() } });
            engine.mutate("insertAuthor", &data).await
        }
    });
    let results = join_all(inserts.collect()).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert!(succeeded >= 1);
    for err in results.into_iter().filter_map(|r| r.err()) {
        assert_eq!(err.code(), "KV_CONCURRENCY_EXHAUSTED");
        assert!(err.is_retryable());
    }
}

/// The next id follows the highest existing row, not the row count.
#[tokio::test]
async fn test_insert_follows_highest_id() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store, 3);

    engine
        .mutate("catalog", &json!({ "addAuthors": [author("40", "x")] }))
        .await
        .unwrap();
    let out = engine
        .mutate("insertAuthor", &json!({ "data": { "name": "y" } }))
        .await
        .unwrap();
    assert_eq!(out.as_success().unwrap().id, RowId::new(41));
}

// =============================================================================
// Transaction Tests
// =============================================================================

/// One colliding insert aborts the whole transaction.
#[tokio::test]
async fn test_transaction_collision_applies_nothing() {
    let engine = engine_with(Arc::new(MemoryStore::new()), 3);

    let first = engine
        .mutate("catalog", &json!({ "addAuthors": [author("1", "A")] }))
        .await
        .unwrap();
    assert!(first.as_success().is_some());

    let out = engine
        .mutate(
            "catalog",
            &json!({
                "addAuthors": [author("2", "B"), author("1", "again")],
                "addBooks": [{ "id": "1", "data": { "title": "T", "author": "2" } }]
            }),
        )
        .await
        .unwrap();
    assert_eq!(out, Output::Null);

    assert!(!author_exists(&engine, "2").await);
    assert!(engine
        .query("book", &json!({ "id": "1" }))
        .await
        .unwrap()
        .is_null());
    let kept = engine.query("author", &json!({ "id": "1" })).await.unwrap();
    assert_eq!(kept.to_json()["name"], "A");
}

/// Rows of several tables commit under one versionstamp.
#[tokio::test]
async fn test_transaction_commits_across_tables() {
    let engine = engine_with(Arc::new(MemoryStore::new()), 3);

    let out = engine
        .mutate(
            "catalog",
            &json!({
                "addAuthors": [author("3", "C")],
                "addBooks": [{ "id": "9", "data": { "title": "T", "author": "3" } }]
            }),
        )
        .await
        .unwrap();
    let vs = out.as_success().unwrap().versionstamp;

    let book = engine
        .query("book", &json!({ "id": "9" }))
        .await
        .unwrap()
        .into_row()
        .unwrap();
    assert_eq!(book.versionstamp(), vs);

    let author = engine.resolve("Book", "author", &book).await.unwrap();
    assert_eq!(author.as_row().unwrap().versionstamp(), vs);
}

/// A transaction delete with a stale versionstamp is a conflict; with the
/// current one it removes the row.
#[tokio::test]
async fn test_transaction_delete_needs_current_versionstamp() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store.clone(), 3);

    engine
        .mutate("catalog", &json!({ "addAuthors": [author("1", "A")] }))
        .await
        .unwrap();
    let row = engine
        .query("author", &json!({ "id": "1" }))
        .await
        .unwrap()
        .into_row()
        .unwrap();
    let current = row.versionstamp();

    // Rewrite the name so the row's id entry is untouched but the store moves on
    let mut op = AtomicOperation::new();
    op.set(
        Key::column("Author", row.id(), "name"),
        json!("renamed"),
    );
    store.commit(op).await.unwrap();

    let stale = current.next();
    let out = engine
        .mutate(
            "catalog",
            &json!({ "removeAuthors": [{ "id": "1", "versionstamp": stale.to_string() }] }),
        )
        .await
        .unwrap();
    assert!(out.is_null());
    assert!(author_exists(&engine, "1").await);

    let out = engine
        .mutate(
            "catalog",
            &json!({ "removeAuthors": [{ "id": "1", "versionstamp": current.to_string() }] }),
        )
        .await
        .unwrap();
    assert!(out.as_success().is_some());
    assert!(!author_exists(&engine, "1").await);
    assert!(store.is_empty().unwrap());
}

/// A transaction delete without a versionstamp is rejected before any
/// write is attempted.
#[tokio::test]
async fn test_transaction_delete_requires_versionstamp() {
    let engine = engine_with(Arc::new(MemoryStore::new()), 3);
    engine
        .mutate("catalog", &json!({ "addAuthors": [author("1", "A")] }))
        .await
        .unwrap();

    let err = engine
        .mutate(
            "catalog",
            &json!({
                "addAuthors": [author("2", "B")],
                "removeAuthors": [{ "id": "1" }]
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "KV_INVALID_INPUT");
    assert!(!author_exists(&engine, "2").await);
}

/// Inserting one id twice in a transaction is rejected; no merged row is
/// written.
#[tokio::test]
async fn test_transaction_same_insert_twice_rejected() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store.clone(), 3);
    engine
        .mutate("catalog", &json!({ "addAuthors": [author("1", "A")] }))
        .await
        .unwrap();
    let entries = store.len().unwrap();
    let last = store.last_versionstamp().unwrap();

    let err = engine
        .mutate(
            "catalog",
            &json!({
                "addBooks": [
                    { "id": "7", "data": { "title": "first", "genre": "SF", "author": "1" } },
                    { "id": "7", "data": { "title": "second", "author": "1" } }
                ]
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "KV_INVALID_INPUT");

    assert!(engine
        .query("book", &json!({ "id": "7" }))
        .await
        .unwrap()
        .is_null());
    assert_eq!(store.len().unwrap(), entries);
    assert_eq!(store.last_versionstamp().unwrap(), last);
}

/// Inserting and deleting the same row in one transaction is rejected and
/// leaves the existing row as it was.
#[tokio::test]
async fn test_transaction_insert_and_delete_same_row_rejected() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(store.clone(), 3);
    engine
        .mutate("catalog", &json!({ "addAuthors": [author("1", "A")] }))
        .await
        .unwrap();
    let row = engine
        .query("author", &json!({ "id": "1" }))
        .await
        .unwrap()
        .into_row()
        .unwrap();
    let entries = store.len().unwrap();
    let last = store.last_versionstamp().unwrap();

    let err = engine
        .mutate(
            "catalog",
            &json!({
                "removeAuthors": [{ "id": "1", "versionstamp": row.versionstamp().to_string() }],
                "addAuthors": [author("1", "replacement")]
            }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "KV_INVALID_INPUT");

    let kept = engine.query("author", &json!({ "id": "1" })).await.unwrap();
    assert_eq!(kept.to_json()["name"], "A");
    assert_eq!(store.len().unwrap(), entries);
    assert_eq!(store.last_versionstamp().unwrap(), last);
}
