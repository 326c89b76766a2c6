//! Report records
//!
//! A [`ReportRecord`] is the diagnostic report built from a fault. Its JSON
//! form is the outbound POST body. Records waiting in the local queues are
//! wrapped in a [`StoredReport`] carrying delivery bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::classification::{FaultCategory, Severity};
use super::newtypes::{ErrorId, SessionId};

/// Maximum message length after truncation
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Maximum stack / component stack length after truncation
pub const MAX_STACK_CHARS: usize = 5000;

/// Marker appended to truncated text
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Diagnostic report sent to the reporting endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub error_id: ErrorId,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_stack: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub user_agent: String,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub severity: Severity,
    pub category: FaultCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_description: Option<String>,
    #[serde(default)]
    pub additional_context: Map<String, Value>,
}

impl ReportRecord {
    /// Truncates message and stacks to their maximum lengths
    pub fn truncate(&mut self) {
        self.message = truncate_chars(&self.message, MAX_MESSAGE_CHARS);
        if let Some(stack) = self.stack.as_mut() {
            *stack = truncate_chars(stack, MAX_STACK_CHARS);
        }
        if let Some(stack) = self.component_stack.as_mut() {
            *stack = truncate_chars(stack, MAX_STACK_CHARS);
        }
    }

    /// Replaces `additionalContext` with a size marker when its JSON form
    /// is larger than `max_bytes`
    pub fn cap_context(&mut self, max_bytes: usize) {
        let bytes = serde_json::to_vec(&self.additional_context)
            .map(|v| v.len())
            .unwrap_or(usize::MAX);
        if bytes <= max_bytes {
            return;
        }
        let mut marker = Map::new();
        marker.insert("contextTruncated".to_string(), Value::Bool(true));
        marker.insert("originalBytes".to_string(), Value::from(bytes as u64));
        self.additional_context = marker;
    }
}

/// Truncates `text` to at most `max` characters, marking the cut
///
/// Operates on characters, never splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(TRUNCATION_MARKER.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

// ============================================================================
// Queue bookkeeping
// ============================================================================

/// Delivery status of a locally stored report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Persisted, not yet delivered (or delivery not allowed)
    Pending,
    /// Delivered to the reporting endpoint
    Sent,
    /// Delivery failed; eligible for retry
    Failed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "pending"),
            ReportStatus::Sent => write!(f, "sent"),
            ReportStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A report record plus its local delivery state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub record: ReportRecord,
    pub status: ReportStatus,
    pub stored_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Id assigned by the reporting endpoint on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl StoredReport {
    pub fn pending(record: ReportRecord, stored_at: DateTime<Utc>) -> Self {
        Self {
            record,
            status: ReportStatus::Pending,
            stored_at,
            attempts: 0,
            last_error: None,
            remote_id: None,
        }
    }

    pub fn error_id(&self) -> ErrorId {
        self.record.error_id
    }
}

// ============================================================================
// Wire responses
// ============================================================================

/// Body returned by the reporting endpoint on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAck {
    pub success: bool,
    #[serde(default)]
    pub report_id: Option<String>,
}

/// Outcome of a submission as presented to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pre-filled mail composition link offered when delivery failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> ReportRecord {
        ReportRecord {
            error_id: ErrorId::new(),
            message: "boom".into(),
            stack: Some("at a".into()),
            component_stack: None,
            timestamp: Utc::now(),
            url: "https://app.local/home".into(),
            user_agent: "errguard-test".into(),
            session_id: SessionId::new(),
            user_id: None,
            severity: Severity::Medium,
            category: FaultCategory::Runtime,
            user_description: None,
            additional_context: Map::new(),
        }
    }

    #[test]
    fn test_record_wire_shape() {
        let value = serde_json::to_value(record()).unwrap();
        for key in [
            "errorId",
            "message",
            "stack",
            "timestamp",
            "url",
            "userAgent",
            "sessionId",
            "severity",
            "category",
            "additionalContext",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value.get("userId").is_none());
        assert_eq!(value["severity"], json!("medium"));
    }

    #[test]
    fn test_truncate_long_fields() {
        let mut r = record();
        r.message = "x".repeat(MAX_MESSAGE_CHARS + 50);
        r.stack = Some("y".repeat(MAX_STACK_CHARS * 2));
        r.truncate();
        assert_eq!(r.message.chars().count(), MAX_MESSAGE_CHARS);
        assert!(r.message.ends_with(TRUNCATION_MARKER));
        assert_eq!(r.stack.unwrap().chars().count(), MAX_STACK_CHARS);
    }

    #[test]
    fn test_cap_context_replaces_oversized_map() {
        let mut r = record();
        r.cap_context(1024);
        assert!(r.additional_context.get("contextTruncated").is_none());

        r.additional_context
            .insert("blob".to_string(), json!("z".repeat(4096)));
        r.cap_context(1024);
        assert_eq!(r.additional_context["contextTruncated"], json!(true));
        assert!(r.additional_context["originalBytes"].as_u64().unwrap() > 4096);
        assert!(r.additional_context.get("blob").is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(40);
        let out = truncate_chars(&text, 20);
        assert_eq!(out.chars().count(), 20);
        assert_eq!(truncate_chars("short", 20), "short");
    }

    #[test]
    fn test_ack_parses_without_report_id() {
        let ack: RemoteAck = serde_json::from_value(json!({ "success": true })).unwrap();
        assert!(ack.success);
        assert!(ack.report_id.is_none());
    }
}
