//! Configuration module for errguard.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Every section is `#[serde(default)]`, so a file only needs the keys it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::alert::{AlertChannel, AlertConfig};
use crate::domain::consent::CURRENT_CONSENT_VERSION;
pub use crate::domain::validation::ValidationError;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for errguard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub reporting: ReportingConfig,
    pub recovery: RecoveryConfig,
    pub monitoring: MonitoringConfig,
    pub privacy: PrivacyConfig,
    pub storage: StorageConfig,
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level: `debug`, `info`, `warn`, `error`, or `critical`.
    pub min_level: String,
    /// Mirror entries to the process diagnostics (tracing).
    pub enable_console_logging: bool,
    /// Keep a capped FIFO of entries in the persistent store.
    pub enable_local_storage: bool,
    /// Maximum number of entries kept locally.
    pub max_local_storage_entries: usize,
    /// Entries buffered before a remote flush is forced.
    pub batch_size: usize,
    /// Milliseconds between periodic remote flushes.
    pub flush_interval_ms: u64,
    /// Ship entries to `remote_endpoint`.
    pub enable_remote_logging: bool,
    pub remote_endpoint: Option<String>,
    /// Attempts per remote flush before entries are re-queued.
    pub max_retries: u32,
    /// Base delay between remote flush attempts (milliseconds).
    pub retry_delay_ms: u64,
}

/// Report pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Endpoint receiving report POSTs. Reports stay local when unset.
    pub endpoint: Option<String>,
    /// Address pre-filled in the fallback mail link.
    pub support_email: String,
    /// Capacity of the pending and failed queues (oldest evicted).
    pub max_queue_size: usize,
    /// Delivery attempts per submission.
    pub max_retries: u32,
    /// Base delay between delivery attempts (milliseconds).
    pub retry_delay_ms: u64,
    /// Per-request timeout (milliseconds).
    pub request_timeout_ms: u64,
    /// Location reported as the report `url` when the host has none.
    pub app_url: String,
    /// Agent string reported as `userAgent`.
    pub user_agent: String,
    /// Maximum user actions attached to a report.
    pub max_user_actions: usize,
}

/// Recovery controller settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Manual retries allowed before a boundary is exhausted.
    pub max_retries: u32,
    /// Minimum seconds between two recovery attempts.
    pub cooldown_secs: u64,
    /// Enable one-shot automatic recovery for transient faults.
    pub auto_recovery: bool,
    /// Auto-recovery delay for network faults (milliseconds).
    pub network_delay_ms: u64,
    /// Auto-recovery delay for low-severity and user faults (milliseconds).
    pub user_delay_ms: u64,
    /// First retry backoff step (milliseconds).
    pub backoff_base_ms: u64,
    /// Upper bound of the retry backoff (milliseconds).
    pub backoff_max_ms: u64,
}

/// Monitoring and alerting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Errors per hour above which an alert fires.
    pub error_rate_threshold: f64,
    /// Critical errors in the window above which an alert fires.
    pub critical_error_threshold: u32,
    /// Width of the evaluation window (minutes).
    pub time_window_minutes: u32,
    /// Channels: `console`, `webhook`, `email`.
    pub alert_channels: Vec<String>,
    pub webhook_url: Option<String>,
    pub email_recipients: Vec<String>,
    /// Relay endpoint that turns email alert payloads into mail.
    pub email_endpoint: Option<String>,
    /// Ring buffer capacity (oldest evicted).
    pub buffer_size: usize,
    /// Record operation timings on the performance side channel.
    pub enable_performance: bool,
}

/// Privacy / sanitization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Hosts whose URLs are kept (query still scrubbed).
    pub allowed_hosts: Vec<String>,
    /// Replace filesystem paths with a placeholder.
    pub redact_paths: bool,
    /// Maximum nesting depth traversed when sanitizing context.
    pub max_depth: usize,
    /// Consent text version; stored consent for another version is stale.
    pub consent_version: String,
}

/// Persistent storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding persisted state.
    pub database_path: PathBuf,
    /// Keep persisted state in memory only.
    pub in_memory: bool,
}

// ---------------------------------------------------------------------------
// Config::load() / save()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/errguard/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("errguard")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            min_level: "info".to_string(),
            enable_console_logging: true,
            enable_local_storage: true,
            max_local_storage_entries: 100,
            batch_size: 10,
            flush_interval_ms: 30_000,
            enable_remote_logging: false,
            remote_endpoint: None,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            support_email: "support@example.com".to_string(),
            max_queue_size: 50,
            max_retries: 3,
            retry_delay_ms: 1_000,
            request_timeout_ms: 10_000,
            app_url: "app://errguard".to_string(),
            user_agent: format!("errguard/{}", env!("CARGO_PKG_VERSION")),
            max_user_actions: 50,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            cooldown_secs: 30,
            auto_recovery: true,
            network_delay_ms: 3_000,
            user_delay_ms: 1_000,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        let alerts = AlertConfig::default();
        Self {
            error_rate_threshold: alerts.error_rate_threshold,
            critical_error_threshold: alerts.critical_error_threshold,
            time_window_minutes: alerts.time_window_minutes,
            alert_channels: alerts
                .alert_channels
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
            webhook_url: None,
            email_recipients: Vec::new(),
            email_endpoint: None,
            buffer_size: 1000,
            enable_performance: true,
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            redact_paths: true,
            max_depth: 10,
            consent_version: CURRENT_CONSENT_VERSION.to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("errguard")
                .join("state.db"),
            in_memory: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

impl LoggingConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ReportingConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl RecoveryConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl MonitoringConfig {
    /// Typed alert configuration; unknown channel names are skipped
    /// (they are reported by [`Config::validate`]).
    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            error_rate_threshold: self.error_rate_threshold,
            critical_error_threshold: self.critical_error_threshold,
            time_window_minutes: self.time_window_minutes,
            alert_channels: self
                .alert_channels
                .iter()
                .filter_map(|c| c.parse::<AlertChannel>().ok())
                .collect(),
            webhook_url: self.webhook_url.clone(),
            email_recipients: self.email_recipients.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// Valid values for `logging.min_level`.
const VALID_LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error", "critical"];

/// Valid values for `monitoring.alert_channels`.
const VALID_ALERT_CHANNELS: &[&str] = &["console", "webhook", "email"];

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.min_level.as_str()) {
            errors.push(ValidationError::new(
                "logging.min_level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.min_level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }
        if self.logging.enable_local_storage && self.logging.max_local_storage_entries == 0 {
            errors.push(ValidationError::new(
                "logging.max_local_storage_entries",
                "must be greater than 0 when local storage is enabled",
            ));
        }
        if self.logging.batch_size == 0 {
            errors.push(ValidationError::new(
                "logging.batch_size",
                "must be greater than 0",
            ));
        }
        if self.logging.flush_interval_ms == 0 {
            errors.push(ValidationError::new(
                "logging.flush_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.logging.enable_remote_logging {
            match &self.logging.remote_endpoint {
                None => errors.push(ValidationError::new(
                    "logging.remote_endpoint",
                    "required when remote logging is enabled",
                )),
                Some(endpoint) if !is_http_url(endpoint) => errors.push(ValidationError::new(
                    "logging.remote_endpoint",
                    format!("must be an http(s) URL: {endpoint}"),
                )),
                Some(_) => {}
            }
        }

        // --- reporting ---
        if let Some(endpoint) = &self.reporting.endpoint {
            if !is_http_url(endpoint) {
                errors.push(ValidationError::new(
                    "reporting.endpoint",
                    format!("must be an http(s) URL: {endpoint}"),
                ));
            }
        }
        if !self.reporting.support_email.contains('@') {
            errors.push(ValidationError::new(
                "reporting.support_email",
                "must be an email address",
            ));
        }
        if self.reporting.max_queue_size == 0 {
            errors.push(ValidationError::new(
                "reporting.max_queue_size",
                "must be greater than 0",
            ));
        }
        if self.reporting.request_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "reporting.request_timeout_ms",
                "must be greater than 0",
            ));
        }

        // --- recovery ---
        if self.recovery.max_retries == 0 || self.recovery.max_retries > 10 {
            errors.push(ValidationError::new(
                "recovery.max_retries",
                "must be in range 1..=10",
            ));
        }
        if self.recovery.backoff_base_ms > self.recovery.backoff_max_ms {
            errors.push(ValidationError::new(
                "recovery.backoff_base_ms",
                format!(
                    "backoff_base_ms ({}) must not exceed backoff_max_ms ({})",
                    self.recovery.backoff_base_ms, self.recovery.backoff_max_ms
                ),
            ));
        }

        // --- monitoring ---
        if !(self.monitoring.error_rate_threshold > 0.0) {
            errors.push(ValidationError::new(
                "monitoring.error_rate_threshold",
                "must be greater than 0",
            ));
        }
        if self.monitoring.time_window_minutes == 0 || self.monitoring.time_window_minutes > 1440 {
            errors.push(ValidationError::new(
                "monitoring.time_window_minutes",
                "must be in range 1..=1440",
            ));
        }
        if self.monitoring.buffer_size == 0 {
            errors.push(ValidationError::new(
                "monitoring.buffer_size",
                "must be greater than 0",
            ));
        }
        for channel in &self.monitoring.alert_channels {
            if !VALID_ALERT_CHANNELS.contains(&channel.as_str()) {
                errors.push(ValidationError::new(
                    "monitoring.alert_channels",
                    format!(
                        "invalid channel '{}'; valid options: {}",
                        channel,
                        VALID_ALERT_CHANNELS.join(", ")
                    ),
                ));
            }
        }
        let has_channel = |name: &str| self.monitoring.alert_channels.iter().any(|c| c == name);
        if has_channel("webhook") {
            match &self.monitoring.webhook_url {
                None => errors.push(ValidationError::new(
                    "monitoring.webhook_url",
                    "required when the webhook channel is enabled",
                )),
                Some(url) if !is_http_url(url) => errors.push(ValidationError::new(
                    "monitoring.webhook_url",
                    format!("must be an http(s) URL: {url}"),
                )),
                Some(_) => {}
            }
        }
        if has_channel("email") {
            if self.monitoring.email_recipients.is_empty() {
                errors.push(ValidationError::new(
                    "monitoring.email_recipients",
                    "required when the email channel is enabled",
                ));
            }
            if let Some(recipient) = self
                .monitoring
                .email_recipients
                .iter()
                .find(|r| !r.contains('@'))
            {
                errors.push(ValidationError::new(
                    "monitoring.email_recipients",
                    format!("not an email address: {recipient}"),
                ));
            }
        }

        // --- privacy ---
        if self.privacy.max_depth == 0 || self.privacy.max_depth > 32 {
            errors.push(ValidationError::new(
                "privacy.max_depth",
                "must be in range 1..=32",
            ));
        }
        if self.privacy.consent_version.trim().is_empty() {
            errors.push(ValidationError::new(
                "privacy.consent_version",
                "must not be empty",
            ));
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use errguard_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .logging_min_level("debug")
///     .reporting_endpoint("https://errors.example.com/api/reports")
///     .monitoring_error_rate_threshold(5.0)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- logging ---

    pub fn logging_min_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.min_level = level.into();
        self
    }

    pub fn logging_console(mut self, enabled: bool) -> Self {
        self.config.logging.enable_console_logging = enabled;
        self
    }

    pub fn logging_local_storage(mut self, enabled: bool, max_entries: usize) -> Self {
        self.config.logging.enable_local_storage = enabled;
        self.config.logging.max_local_storage_entries = max_entries;
        self
    }

    pub fn logging_batch_size(mut self, n: usize) -> Self {
        self.config.logging.batch_size = n;
        self
    }

    pub fn logging_flush_interval_ms(mut self, ms: u64) -> Self {
        self.config.logging.flush_interval_ms = ms;
        self
    }

    pub fn logging_remote_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.logging.enable_remote_logging = true;
        self.config.logging.remote_endpoint = Some(endpoint.into());
        self
    }

    pub fn logging_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.config.logging.max_retries = max_retries;
        self.config.logging.retry_delay_ms = retry_delay_ms;
        self
    }

    // --- reporting ---

    pub fn reporting_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.reporting.endpoint = Some(endpoint.into());
        self
    }

    pub fn reporting_support_email(mut self, email: impl Into<String>) -> Self {
        self.config.reporting.support_email = email.into();
        self
    }

    pub fn reporting_max_queue_size(mut self, n: usize) -> Self {
        self.config.reporting.max_queue_size = n;
        self
    }

    pub fn reporting_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.config.reporting.max_retries = max_retries;
        self.config.reporting.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn reporting_app_url(mut self, url: impl Into<String>) -> Self {
        self.config.reporting.app_url = url.into();
        self
    }

    // --- recovery ---

    pub fn recovery_max_retries(mut self, n: u32) -> Self {
        self.config.recovery.max_retries = n;
        self
    }

    pub fn recovery_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.recovery.cooldown_secs = secs;
        self
    }

    pub fn recovery_auto(mut self, enabled: bool) -> Self {
        self.config.recovery.auto_recovery = enabled;
        self
    }

    // --- monitoring ---

    pub fn monitoring_error_rate_threshold(mut self, per_hour: f64) -> Self {
        self.config.monitoring.error_rate_threshold = per_hour;
        self
    }

    pub fn monitoring_critical_error_threshold(mut self, n: u32) -> Self {
        self.config.monitoring.critical_error_threshold = n;
        self
    }

    pub fn monitoring_time_window_minutes(mut self, minutes: u32) -> Self {
        self.config.monitoring.time_window_minutes = minutes;
        self
    }

    pub fn monitoring_alert_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.monitoring.alert_channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn monitoring_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.config.monitoring.webhook_url = Some(url.into());
        self
    }

    pub fn monitoring_email(mut self, endpoint: impl Into<String>, recipients: Vec<String>) -> Self {
        self.config.monitoring.email_endpoint = Some(endpoint.into());
        self.config.monitoring.email_recipients = recipients;
        self
    }

    // --- privacy ---

    pub fn privacy_allowed_hosts(mut self, hosts: Vec<String>) -> Self {
        self.config.privacy.allowed_hosts = hosts;
        self
    }

    pub fn privacy_max_depth(mut self, depth: usize) -> Self {
        self.config.privacy.max_depth = depth;
        self
    }

    // --- storage ---

    pub fn storage_database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    pub fn storage_in_memory(mut self, in_memory: bool) -> Self {
        self.config.storage.in_memory = in_memory;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
