//! User action log
//!
//! Recent user interactions ("breadcrumbs") attached to reports as
//! `additionalContext.userActions`. The log is capped; the oldest action
//! is dropped first. Consent is checked by the pipeline before recording.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use errguard_core::ports::{keys, read_json, remove_logged, write_json, IStateStore};

/// A single recorded interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    pub timestamp: DateTime<Utc>,
    /// What happened, e.g. `click`, `navigate`, `submit`
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl UserAction {
    pub fn new(action: impl Into<String>, target: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            target,
        }
    }
}

pub struct UserActionLog {
    store: Arc<dyn IStateStore>,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl UserActionLog {
    pub fn new(store: Arc<dyn IStateStore>, max_entries: usize) -> Self {
        Self {
            store,
            max_entries,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn record(&self, action: UserAction) {
        if self.max_entries == 0 {
            return;
        }
        let _guard = self.write_lock.lock().await;
        let mut actions = self.recent().await;
        actions.push(action);
        if actions.len() > self.max_entries {
            let overflow = actions.len() - self.max_entries;
            actions.drain(..overflow);
        }
        write_json(self.store.as_ref(), keys::USER_ACTIONS, &actions).await;
    }

    /// Recorded actions, oldest first
    pub async fn recent(&self) -> Vec<UserAction> {
        read_json::<Vec<UserAction>>(self.store.as_ref(), keys::USER_ACTIONS).await
    }

    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        remove_logged(self.store.as_ref(), keys::USER_ACTIONS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errguard_core::ports::MemoryStateStore;

    #[tokio::test]
    async fn test_log_is_capped_fifo() {
        let log = UserActionLog::new(Arc::new(MemoryStateStore::new()), 2);
        for target in ["a", "b", "c"] {
            log.record(UserAction::new("click", Some(target.to_string())))
                .await;
        }
        let targets: Vec<_> = log
            .recent()
            .await
            .into_iter()
            .filter_map(|a| a.target)
            .collect();
        assert_eq!(targets, vec!["b", "c"]);

        assert!(log.clear().await);
        assert!(log.recent().await.is_empty());
    }
}
