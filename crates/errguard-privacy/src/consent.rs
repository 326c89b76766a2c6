//! Consent management
//!
//! [`ConsentManager`] persists the user's [`ConsentConfig`] and answers
//! whether a kind of data may be collected or reports may leave the device.
//! Consent that is expired or was given for an older consent version
//! grants nothing until the user is asked again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use errguard_core::domain::consent::{
    merge_overrides, ConsentConfig, ConsentLevel, ConsentOverrides, DataType,
    CURRENT_CONSENT_VERSION,
};
use errguard_core::ports::{keys, read_json, remove_logged, write_json, IStateStore};

/// Errors returned by consent operations
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConsentError {
    /// An update was requested but the user never gave consent
    #[error("No existing consent to update")]
    NoExistingConsent,

    /// The consent configuration could not be persisted
    #[error("Failed to persist consent: {0}")]
    Storage(String),
}

/// Snapshot returned by [`ConsentManager::get_status`]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentStatus {
    /// A consent above `none` is stored
    pub has_consent: bool,
    pub level: ConsentLevel,
    pub config: Option<ConsentConfig>,
    /// The user must be asked (again) before collecting anything
    pub needs_update: bool,
}

/// Stores and evaluates user consent
pub struct ConsentManager {
    store: Arc<dyn IStateStore>,
    version: String,
}

impl ConsentManager {
    /// Creates a manager using the current consent version
    pub fn new(store: Arc<dyn IStateStore>) -> Self {
        Self::with_version(store, CURRENT_CONSENT_VERSION)
    }

    /// Creates a manager for a specific consent version
    pub fn with_version(store: Arc<dyn IStateStore>, version: impl Into<String>) -> Self {
        Self {
            store,
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Raw stored configuration, whether or not it is still valid
    pub async fn stored_config(&self) -> Option<ConsentConfig> {
        read_json::<Option<ConsentConfig>>(self.store.as_ref(), keys::CONSENT).await
    }

    pub async fn get_status(&self) -> ConsentStatus {
        self.get_status_at(Utc::now()).await
    }

    pub async fn get_status_at(&self, now: DateTime<Utc>) -> ConsentStatus {
        match self.stored_config().await {
            Some(config) => ConsentStatus {
                has_consent: config.level != ConsentLevel::None,
                level: config.level,
                needs_update: config.needs_update_at(now, &self.version),
                config: Some(config),
            },
            None => ConsentStatus {
                has_consent: false,
                level: ConsentLevel::None,
                config: None,
                needs_update: true,
            },
        }
    }

    /// Configuration in force at `now`; `None` when missing, expired or stale
    pub async fn effective_config_at(&self, now: DateTime<Utc>) -> Option<ConsentConfig> {
        self.stored_config()
            .await
            .filter(|config| !config.needs_update_at(now, &self.version))
    }

    pub async fn effective_config(&self) -> Option<ConsentConfig> {
        self.effective_config_at(Utc::now()).await
    }

    /// Records consent at `level` using the level table
    ///
    /// Choosing `none` also purges data collected under earlier consent.
    pub async fn set_level(&self, level: ConsentLevel) -> Result<ConsentConfig, ConsentError> {
        self.set_level_at(level, Utc::now()).await
    }

    pub async fn set_level_at(
        &self,
        level: ConsentLevel,
        now: DateTime<Utc>,
    ) -> Result<ConsentConfig, ConsentError> {
        let config = ConsentConfig::for_level(level, now, &self.version);
        self.persist(&config).await?;
        if level == ConsentLevel::None {
            self.purge_collected_data().await;
        }
        tracing::info!(level = %level, version = %self.version, "Consent level set");
        Ok(config)
    }

    /// Applies individual flag overrides on top of the stored consent
    pub async fn update_config(
        &self,
        overrides: &ConsentOverrides,
    ) -> Result<ConsentConfig, ConsentError> {
        let current = self
            .stored_config()
            .await
            .ok_or(ConsentError::NoExistingConsent)?;
        let merged = merge_overrides(&current, overrides);
        self.persist(&merged).await?;
        tracing::info!(level = %merged.level, "Consent configuration updated");
        Ok(merged)
    }

    /// Withdraws consent and purges pending reports, failed reports and
    /// user actions. Revoking twice is harmless.
    pub async fn revoke(&self) -> Result<(), ConsentError> {
        let config = ConsentConfig::for_level(ConsentLevel::None, Utc::now(), &self.version);
        self.persist(&config).await?;
        self.purge_collected_data().await;
        tracing::info!("Consent revoked, collected data purged");
        Ok(())
    }

    pub async fn is_data_type_allowed(&self, data_type: DataType) -> bool {
        self.is_data_type_allowed_at(data_type, Utc::now()).await
    }

    pub async fn is_data_type_allowed_at(&self, data_type: DataType, now: DateTime<Utc>) -> bool {
        self.effective_config_at(now)
            .await
            .map(|config| config.allows(data_type))
            .unwrap_or(false)
    }

    /// Whether reports may be sent off the device
    pub async fn is_reporting_allowed(&self) -> bool {
        self.is_reporting_allowed_at(Utc::now()).await
    }

    pub async fn is_reporting_allowed_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_config_at(now)
            .await
            .map(|config| config.allow_external_reporting)
            .unwrap_or(false)
    }

    async fn persist(&self, config: &ConsentConfig) -> Result<(), ConsentError> {
        let raw = serde_json::to_string(config)
            .map_err(|e| ConsentError::Storage(e.to_string()))?;
        self.store
            .set(keys::CONSENT, &raw)
            .await
            .map_err(|e| ConsentError::Storage(e.to_string()))
    }

    async fn purge_collected_data(&self) {
        for key in [
            keys::PENDING_REPORTS,
            keys::FAILED_REPORTS,
            keys::USER_ACTIONS,
        ] {
            // Overwrite first so a failed remove never leaves data behind
            write_json(self.store.as_ref(), key, &Vec::<Value>::new()).await;
            remove_logged(self.store.as_ref(), key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use errguard_core::ports::MemoryStateStore;

    fn manager() -> (Arc<MemoryStateStore>, ConsentManager) {
        let store = Arc::new(MemoryStateStore::new());
        let manager = ConsentManager::new(store.clone());
        (store, manager)
    }

    #[tokio::test]
    async fn test_status_without_consent() {
        let (_, manager) = manager();
        let status = manager.get_status().await;
        assert!(!status.has_consent);
        assert_eq!(status.level, ConsentLevel::None);
        assert!(status.needs_update);
        assert!(!manager.is_reporting_allowed().await);
    }

    #[tokio::test]
    async fn test_basic_and_full_personal_info() {
        let (_, manager) = manager();
        let personal: DataType = "includePersonalInfo".parse().unwrap();

        manager.set_level(ConsentLevel::Basic).await.unwrap();
        assert!(!manager.is_data_type_allowed(personal).await);
        assert!(manager.is_data_type_allowed(DataType::StackTraces).await);
        assert!(!manager.is_reporting_allowed().await);

        manager.set_level(ConsentLevel::Full).await.unwrap();
        assert!(manager.is_data_type_allowed(personal).await);
        assert!(manager.is_reporting_allowed().await);
    }

    #[tokio::test]
    async fn test_update_without_consent_is_distinct_error() {
        let (_, manager) = manager();
        let err = manager
            .update_config(&ConsentOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err, ConsentError::NoExistingConsent);
    }

    #[tokio::test]
    async fn test_update_applies_overrides() {
        let (_, manager) = manager();
        manager.set_level(ConsentLevel::Detailed).await.unwrap();
        let updated = manager
            .update_config(&ConsentOverrides {
                include_user_actions: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!updated.include_user_actions);
        assert!(!manager.is_data_type_allowed(DataType::UserActions).await);
        assert!(manager.is_reporting_allowed().await);
    }

    #[tokio::test]
    async fn test_revoke_purges_queues_and_is_idempotent() {
        let (store, manager) = manager();
        manager.set_level(ConsentLevel::Full).await.unwrap();
        store.set(keys::PENDING_REPORTS, "[{\"x\":1}]").await.unwrap();
        store.set(keys::FAILED_REPORTS, "[{\"x\":2}]").await.unwrap();
        store.set(keys::USER_ACTIONS, "[\"click\"]").await.unwrap();

        manager.revoke().await.unwrap();
        manager.revoke().await.unwrap();

        let status = manager.get_status().await;
        assert_eq!(status.level, ConsentLevel::None);
        assert!(!status.has_consent);
        assert!(store.get(keys::PENDING_REPORTS).await.unwrap().is_none());
        assert!(store.get(keys::FAILED_REPORTS).await.unwrap().is_none());
        assert!(store.get(keys::USER_ACTIONS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_consent_grants_nothing() {
        let (_, manager) = manager();
        let given = Utc::now() - Duration::days(400);
        manager.set_level_at(ConsentLevel::Full, given).await.unwrap();

        let status = manager.get_status().await;
        assert!(status.has_consent);
        assert!(status.needs_update);
        assert!(!manager.is_data_type_allowed(DataType::SystemInfo).await);
        assert!(!manager.is_reporting_allowed().await);
    }

    #[tokio::test]
    async fn test_stale_version_needs_update() {
        let store: Arc<dyn IStateStore> = Arc::new(MemoryStateStore::new());
        ConsentManager::with_version(store.clone(), "1.0")
            .set_level(ConsentLevel::Detailed)
            .await
            .unwrap();

        let newer = ConsentManager::with_version(store, "2.0");
        assert!(newer.get_status().await.needs_update);
        assert!(!newer.is_reporting_allowed().await);
    }

    #[tokio::test]
    async fn test_corrupt_consent_reads_as_missing() {
        let (store, manager) = manager();
        store.set(keys::CONSENT, "garbage").await.unwrap();
        assert!(manager.get_status().await.config.is_none());
    }
}
