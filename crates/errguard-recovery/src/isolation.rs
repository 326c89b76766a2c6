//! Isolation markers
//!
//! An isolated boundary keeps its fault to itself. The marker is written
//! to the session store so the isolation survives a reload within the
//! same session.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use errguard_core::domain::{BoundaryId, ErrorId};
use errguard_core::ports::{keys, read_json, write_json, IStateStore};

/// Persisted record of an isolated boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationMarker {
    pub boundary: BoundaryId,
    pub isolated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_id: Option<ErrorId>,
}

type MarkerMap = BTreeMap<BoundaryId, IsolationMarker>;

/// Reads and writes isolation markers in a session store
#[derive(Clone)]
pub struct IsolationStore {
    store: Arc<dyn IStateStore>,
}

impl IsolationStore {
    pub fn new(store: Arc<dyn IStateStore>) -> Self {
        Self { store }
    }

    /// Records `boundary` as isolated; returns false if the write failed
    pub async fn mark(&self, boundary: &BoundaryId, error_id: Option<ErrorId>) -> bool {
        let mut markers = self.load().await;
        markers.insert(
            boundary.clone(),
            IsolationMarker {
                boundary: boundary.clone(),
                isolated_at: Utc::now(),
                error_id,
            },
        );
        write_json(self.store.as_ref(), keys::ISOLATION, &markers).await
    }

    /// Lifts the isolation of `boundary`
    pub async fn clear(&self, boundary: &BoundaryId) -> bool {
        let mut markers = self.load().await;
        if markers.remove(boundary).is_none() {
            return true;
        }
        write_json(self.store.as_ref(), keys::ISOLATION, &markers).await
    }

    pub async fn is_isolated(&self, boundary: &BoundaryId) -> bool {
        self.load().await.contains_key(boundary)
    }

    pub async fn list(&self) -> Vec<IsolationMarker> {
        self.load().await.into_values().collect()
    }

    async fn load(&self) -> MarkerMap {
        read_json::<MarkerMap>(self.store.as_ref(), keys::ISOLATION).await
    }
}
