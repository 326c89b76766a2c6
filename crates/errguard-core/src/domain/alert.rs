//! Alert configuration types

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Destination of a threshold alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertChannel {
    /// Emitted as a warning-level diagnostic
    Console,
    /// POSTed as JSON to `webhook_url`
    Webhook,
    /// Sent to `email_recipients` through the email relay endpoint
    Email,
}

impl AlertChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertChannel::Console => "console",
            AlertChannel::Webhook => "webhook",
            AlertChannel::Email => "email",
        }
    }
}

impl Display for AlertChannel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertChannel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(AlertChannel::Console),
            "webhook" => Ok(AlertChannel::Webhook),
            "email" => Ok(AlertChannel::Email),
            other => Err(DomainError::InvalidAlertChannel(other.to_string())),
        }
    }
}

/// Thresholds and destinations for monitoring alerts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Errors per hour above which an alert fires
    pub error_rate_threshold: f64,
    /// Critical errors in the window above which an alert fires
    pub critical_error_threshold: u32,
    /// Width of the evaluation window
    pub time_window_minutes: u32,
    pub alert_channels: Vec<AlertChannel>,
    pub webhook_url: Option<String>,
    pub email_recipients: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold: 10.0,
            critical_error_threshold: 5,
            time_window_minutes: 60,
            alert_channels: vec![AlertChannel::Console],
            webhook_url: None,
            email_recipients: Vec::new(),
        }
    }
}
