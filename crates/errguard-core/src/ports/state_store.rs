//! Key/value state store port (driven/secondary port)
//!
//! Every piece of persisted state (consent, report queues, session id,
//! isolation markers, logger entries, user actions) is a JSON document
//! stored under a fixed key. Two scopes exist: a persistent store that
//! survives restarts and a session store that lives as long as the
//! process.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage failures are adapter-specific.
//! - Last writer wins per key; there is no cross-key transaction.
//! - [`read_json`] treats missing or corrupt documents as empty so a
//!   damaged entry never blocks fault handling.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Well-known storage keys
pub mod keys {
    /// Persisted consent configuration
    pub const CONSENT: &str = "errguard.consent";
    /// Reports waiting for delivery
    pub const PENDING_REPORTS: &str = "errguard.reports.pending";
    /// Reports whose delivery failed
    pub const FAILED_REPORTS: &str = "errguard.reports.failed";
    /// Per-session identifier (session scope)
    pub const SESSION_ID: &str = "errguard.session_id";
    /// Isolation markers by boundary (session scope)
    pub const ISOLATION: &str = "errguard.isolation";
    /// Logger entries, capped FIFO
    pub const LOGS: &str = "errguard.logs";
    /// User action breadcrumbs
    pub const USER_ACTIONS: &str = "errguard.user_actions";
}

// ============================================================================
// IStateStore trait
// ============================================================================

/// Port trait for scoped key/value storage of JSON documents
#[async_trait::async_trait]
pub trait IStateStore: Send + Sync {
    /// Returns the raw document stored under `key`, if any
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous document
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Removes `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Reads and deserializes the document under `key`
///
/// Missing keys, storage failures and corrupt JSON all yield
/// `T::default()`; failures are logged.
pub async fn read_json<T>(store: &dyn IStateStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding corrupt stored document");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read from state store");
            T::default()
        }
    }
}

/// Serializes and stores `value` under `key`
///
/// Returns `false` (after logging) when the write failed.
pub async fn write_json<T>(store: &dyn IStateStore, key: &str, value: &T) -> bool
where
    T: Serialize + ?Sized,
{
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to serialize document");
            return false;
        }
    };
    match store.set(key, &raw).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to write to state store");
            false
        }
    }
}

/// Removes `key`, logging instead of failing
pub async fn remove_logged(store: &dyn IStateStore, key: &str) -> bool {
    match store.remove(key).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to remove from state store");
            false
        }
    }
}

// ============================================================================
// In-memory adapter
// ============================================================================

/// Process-lifetime store, used as the session scope and in tests
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl IStateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
