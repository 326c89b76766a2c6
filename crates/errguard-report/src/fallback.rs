//! Mail-composition fallback
//!
//! When delivery fails the caller is offered a pre-filled `mailto:` link so
//! the user can still send the report. Mail clients reject very long
//! links, so the body is cut until the whole link fits.

use url::Url;

use errguard_core::domain::ReportRecord;

/// Upper bound on the length of a generated link
pub const MAX_MAILTO_CHARS: usize = 2000;

/// Builds a `mailto:` link addressed to `support_email` describing `record`
///
/// Returns `None` if `support_email` does not form a valid link.
pub fn mailto_link(support_email: &str, record: &ReportRecord, delivery_error: &str) -> Option<String> {
    let subject = format!("Error report {}", record.error_id.short());
    let mut body = format!(
        "Error ID: {}\nTime: {}\nType: {}/{}\nLocation: {}\nDelivery error: {}\n\nMessage:\n{}",
        record.error_id,
        record.timestamp.to_rfc3339(),
        record.category,
        record.severity,
        record.url,
        delivery_error,
        record.message,
    );
    if let Some(description) = &record.user_description {
        body.push_str("\n\nWhat I was doing:\n");
        body.push_str(description);
    }

    loop {
        let link = build(support_email, &subject, &body)?;
        let len = link.chars().count();
        if len <= MAX_MAILTO_CHARS || body.is_empty() {
            return Some(link);
        }
        // Encoded characters take up to 9 bytes; cut at least the overflow
        let overflow = (len - MAX_MAILTO_CHARS).div_ceil(3).max(1);
        let keep = body.chars().count().saturating_sub(overflow);
        body = body.chars().take(keep).collect();
    }
}

fn build(support_email: &str, subject: &str, body: &str) -> Option<String> {
    let mut url = Url::parse(&format!("mailto:{}", support_email.trim())).ok()?;
    url.query_pairs_mut()
        .append_pair("subject", subject)
        .append_pair("body", body);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use errguard_core::domain::{ErrorId, FaultCategory, SessionId, Severity};
    use serde_json::Map;

    fn record(message: String) -> ReportRecord {
        ReportRecord {
            error_id: ErrorId::new(),
            message,
            stack: None,
            component_stack: None,
            timestamp: Utc::now(),
            url: "app://errguard/settings".into(),
            user_agent: "errguard-test".into(),
            session_id: SessionId::new(),
            user_id: None,
            severity: Severity::High,
            category: FaultCategory::Network,
            user_description: Some("Saving my profile".into()),
            additional_context: Map::new(),
        }
    }

    #[test]
    fn test_link_contains_subject_and_id() {
        let rec = record("Failed to fetch".into());
        let link = mailto_link("support@example.com", &rec, "HTTP 503").unwrap();
        assert!(link.starts_with("mailto:support@example.com?subject="));
        assert!(link.contains(&rec.error_id.short()));
        assert!(link.contains("body="));
    }

    #[test]
    fn test_long_body_truncated_to_limit() {
        let rec = record("é and spaces ".repeat(400));
        let link = mailto_link("support@example.com", &rec, "timeout").unwrap();
        assert!(link.chars().count() <= MAX_MAILTO_CHARS);
    }
}
