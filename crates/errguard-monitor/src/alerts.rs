//! Threshold alerts and their dispatch
//!
//! An [`Alert`] is raised when the monitored window breaches a threshold.
//! [`AlertDispatcher`] sends it to every configured channel. Channel
//! failures are logged and recorded in the history, never returned.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use errguard_core::domain::{AlertChannel, AlertConfig};
use errguard_core::ports::ITransport;

use crate::metrics::MetricsRegistry;
use crate::window::MetricsWindow;

/// Dispatch outcomes kept for status queries
pub const MAX_ALERT_HISTORY: usize = 100;

/// Which threshold was crossed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertReason {
    ErrorRate { rate: f64, threshold: f64 },
    CriticalErrors { count: usize, threshold: u32 },
}

impl fmt::Display for AlertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertReason::ErrorRate { rate, threshold } => {
                write!(f, "error rate {rate:.1}/h exceeds {threshold:.1}/h")
            }
            AlertReason::CriticalErrors { count, threshold } => {
                write!(f, "{count} critical errors exceed {threshold}")
            }
        }
    }
}

/// Breaches found in `metrics` under `config`
pub fn evaluate(metrics: &MetricsWindow, config: &AlertConfig) -> Vec<AlertReason> {
    let mut reasons = Vec::new();
    if metrics.error_rate > config.error_rate_threshold {
        reasons.push(AlertReason::ErrorRate {
            rate: metrics.error_rate,
            threshold: config.error_rate_threshold,
        });
    }
    if metrics.critical_errors > config.critical_error_threshold as usize {
        reasons.push(AlertReason::CriticalErrors {
            count: metrics.critical_errors,
            threshold: config.critical_error_threshold,
        });
    }
    reasons
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub triggered_at: DateTime<Utc>,
    pub reasons: Vec<AlertReason>,
    pub metrics: MetricsWindow,
}

impl Alert {
    pub fn new(reasons: Vec<AlertReason>, metrics: MetricsWindow, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            triggered_at: at,
            reasons,
            metrics,
        }
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let reasons: Vec<String> = self.reasons.iter().map(ToString::to_string).collect();
        format!(
            "errguard alert: {} ({} errors in the last {} minutes)",
            reasons.join(", "),
            self.metrics.total_errors,
            self.metrics.time_window_minutes
        )
    }
}

/// Result of sending one alert to one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    pub alert_id: Uuid,
    pub channel: AlertChannel,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct AlertDispatcher {
    config: AlertConfig,
    transport: Option<Arc<dyn ITransport>>,
    email_endpoint: Option<String>,
    metrics: Option<Arc<MetricsRegistry>>,
    history: Mutex<VecDeque<DispatchRecord>>,
}

impl AlertDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            transport: None,
            email_endpoint: None,
            metrics: None,
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn ITransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Relay endpoint receiving email alert payloads
    pub fn with_email_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.email_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Sends `alert` to every configured channel
    pub async fn dispatch(&self, alert: &Alert) -> Vec<DispatchRecord> {
        let mut records = Vec::with_capacity(self.config.alert_channels.len());
        for channel in &self.config.alert_channels {
            let result = match channel {
                AlertChannel::Console => {
                    tracing::warn!(alert_id = %alert.id, "{}", alert.summary());
                    Ok(())
                }
                AlertChannel::Webhook => self.send_webhook(alert).await,
                AlertChannel::Email => self.send_email(alert).await,
            };

            if let Err(e) = &result {
                tracing::warn!(alert_id = %alert.id, channel = %channel, error = %e, "Alert dispatch failed");
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_alert(channel.as_str(), result.is_ok());
            }
            records.push(DispatchRecord {
                alert_id: alert.id,
                channel: *channel,
                success: result.is_ok(),
                error: result.err(),
                timestamp: Utc::now(),
            });
        }

        let mut history = self.history.lock().unwrap();
        history.extend(records.iter().cloned());
        while history.len() > MAX_ALERT_HISTORY {
            history.pop_front();
        }
        records
    }

    /// Most recent dispatch outcomes, oldest first
    pub fn history(&self) -> Vec<DispatchRecord> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    async fn send_webhook(&self, alert: &Alert) -> Result<(), String> {
        let url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or_else(|| "no webhook URL configured".to_string())?;
        let body = json!({
            "channel": AlertChannel::Webhook,
            "text": alert.summary(),
            "alert": alert,
        });
        self.post(url, &body).await
    }

    async fn send_email(&self, alert: &Alert) -> Result<(), String> {
        if self.config.email_recipients.is_empty() {
            return Err("no email recipients configured".to_string());
        }
        let Some(endpoint) = self.email_endpoint.as_deref() else {
            tracing::info!(
                recipients = ?self.config.email_recipients,
                "No email relay configured, alert logged only: {}",
                alert.summary()
            );
            return Ok(());
        };
        let body = json!({
            "recipients": self.config.email_recipients,
            "subject": format!("errguard alert {}", alert.triggered_at.to_rfc3339()),
            "body": alert.summary(),
            "alert": alert,
        });
        self.post(endpoint, &body).await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<(), String> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| "no transport configured".to_string())?;
        match transport.post_json(endpoint, body).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(format!("HTTP {}", response.status)),
            Err(e) => Err(e.to_string()),
        }
    }
}
