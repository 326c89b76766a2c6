//! Integration tests for SqliteStateStore
//!
//! Each test creates a fresh database so tests stay isolated.

use errguard_cache::{DatabasePool, SqliteStateStore};
use errguard_core::ports::{keys, read_json, write_json, IStateStore};

/// Create a fresh in-memory store for each test
async fn setup() -> SqliteStateStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteStateStore::new(pool.pool().clone())
}

#[tokio::test]
async fn test_get_missing_key_returns_none() {
    let store = setup().await;
    assert!(store.get(keys::CONSENT).await.unwrap().is_none());
}

#[tokio::test]
async fn test_set_then_get() {
    let store = setup().await;
    store.set(keys::SESSION_ID, "\"abc\"").await.unwrap();
    assert_eq!(
        store.get(keys::SESSION_ID).await.unwrap().as_deref(),
        Some("\"abc\"")
    );
}

#[tokio::test]
async fn test_set_overwrites_last_writer_wins() {
    let store = setup().await;
    store.set("k", "1").await.unwrap();
    store.set("k", "2").await.unwrap();
    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
    assert_eq!(store.keys().await.unwrap(), vec!["k".to_string()]);
}

#[tokio::test]
async fn test_remove_and_clear() {
    let store = setup().await;
    store.set("a", "1").await.unwrap();
    store.set("b", "2").await.unwrap();

    store.remove("a").await.unwrap();
    store.remove("never-existed").await.unwrap();
    assert_eq!(store.keys().await.unwrap(), vec!["b".to_string()]);

    assert_eq!(store.clear().await.unwrap(), 1);
    assert!(store.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_json_helpers_over_sqlite() {
    let store = setup().await;
    let entries = vec![serde_json::json!({ "level": "warn" })];
    assert!(write_json(&store, keys::LOGS, &entries).await);
    let back: Vec<serde_json::Value> = read_json(&store, keys::LOGS).await;
    assert_eq!(back, entries);
}

#[tokio::test]
async fn test_file_database_persists_across_pools() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.db");

    {
        let pool = DatabasePool::new(&path).await.unwrap();
        let store = SqliteStateStore::new(pool.pool().clone());
        store.set(keys::CONSENT, "{\"level\":\"basic\"}").await.unwrap();
        pool.close().await;
    }

    let pool = DatabasePool::new(&path).await.unwrap();
    let store = SqliteStateStore::new(pool.pool().clone());
    assert_eq!(
        store.get(keys::CONSENT).await.unwrap().as_deref(),
        Some("{\"level\":\"basic\"}")
    );
}
