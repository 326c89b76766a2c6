//! System information collector
//!
//! Non-identifying platform details attached to reports when the user
//! consented to system info. Never includes hostname or username.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub os: String,
    pub family: String,
    pub arch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kernel: String,
    pub app_version: String,
}

impl SystemInfo {
    /// Collects information about the running system
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            family: std::env::consts::FAMILY.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            kernel: read_kernel_version(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn read_kernel_version() -> String {
    std::fs::read_to_string("/proc/version")
        .ok()
        .and_then(|v| v.split_whitespace().nth(2).map(String::from))
        .unwrap_or_default()
}
