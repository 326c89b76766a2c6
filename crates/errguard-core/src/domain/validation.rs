//! Report validation
//!
//! Structural and content checks applied to a report before it is
//! persisted or transported. Validation collects every problem rather than
//! stopping at the first, mirroring configuration validation.

use std::fmt;

use chrono::DateTime;
use serde_json::Value;

use super::classification::{FaultCategory, Severity};
use super::newtypes::{ErrorId, SessionId};
use super::report::ReportRecord;

/// A single validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"logging.batch_size"`
    pub field: String,
    /// Human-readable explanation
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Size limits enforced by [`ReportValidator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Longest message accepted before truncation
    pub max_message_chars: usize,
    /// Longest stack accepted before truncation
    pub max_stack_chars: usize,
    pub max_description_chars: usize,
    pub max_url_chars: usize,
    pub max_user_agent_chars: usize,
    /// Serialized size cap of `additionalContext`
    pub max_context_bytes: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_message_chars: 10_000,
            max_stack_chars: 50_000,
            max_description_chars: 2_000,
            max_url_chars: 2_048,
            max_user_agent_chars: 512,
            max_context_bytes: 50 * 1024,
        }
    }
}

/// Fragments never accepted in user-supplied text
const UNSAFE_FRAGMENTS: &[&str] = &["<script", "javascript:", "onerror=", "onload="];

/// Checks report records against [`ValidationLimits`]
#[derive(Debug, Clone, Default)]
pub struct ReportValidator {
    limits: ValidationLimits,
}

impl ReportValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Validates a typed record; an empty vector means valid
    pub fn validate(&self, record: &ReportRecord) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let limits = &self.limits;

        if record.message.trim().is_empty() {
            errors.push(ValidationError::new("message", "must not be empty"));
        } else if record.message.chars().count() > limits.max_message_chars {
            errors.push(ValidationError::new(
                "message",
                format!("exceeds {} characters", limits.max_message_chars),
            ));
        }

        for (field, stack) in [
            ("stack", &record.stack),
            ("componentStack", &record.component_stack),
        ] {
            if let Some(stack) = stack {
                if stack.chars().count() > limits.max_stack_chars {
                    errors.push(ValidationError::new(
                        field,
                        format!("exceeds {} characters", limits.max_stack_chars),
                    ));
                }
            }
        }

        if record.url.trim().is_empty() {
            errors.push(ValidationError::new("url", "must not be empty"));
        } else if record.url.chars().count() > limits.max_url_chars {
            errors.push(ValidationError::new(
                "url",
                format!("exceeds {} characters", limits.max_url_chars),
            ));
        }

        if record.user_agent.chars().count() > limits.max_user_agent_chars {
            errors.push(ValidationError::new(
                "userAgent",
                format!("exceeds {} characters", limits.max_user_agent_chars),
            ));
        }

        if let Some(user_id) = &record.user_id {
            if !is_valid_user_id(user_id) {
                errors.push(ValidationError::new("userId", "has an invalid shape"));
            }
        }

        if let Some(description) = &record.user_description {
            errors.extend(self.validate_description(description));
        }

        let context_bytes = serde_json::to_vec(&record.additional_context)
            .map(|v| v.len())
            .unwrap_or(usize::MAX);
        if context_bytes > limits.max_context_bytes {
            errors.push(ValidationError::new(
                "additionalContext",
                format!("exceeds {} bytes", limits.max_context_bytes),
            ));
        }

        errors
    }

    /// Validates a user-written description
    pub fn validate_description(&self, description: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if description.chars().count() > self.limits.max_description_chars {
            errors.push(ValidationError::new(
                "userDescription",
                format!("exceeds {} characters", self.limits.max_description_chars),
            ));
        }
        let lowered = description.to_lowercase();
        if UNSAFE_FRAGMENTS.iter().any(|f| lowered.contains(f)) {
            errors.push(ValidationError::new(
                "userDescription",
                "contains disallowed markup",
            ));
        }
        errors
    }

    /// Validates an untyped JSON report (stored or received data)
    ///
    /// Checks required fields, their types, identifier and timestamp
    /// formats and enum values. A raw record that passes can be
    /// deserialized into a [`ReportRecord`] and checked with
    /// [`validate`](Self::validate).
    pub fn validate_raw(&self, raw: &Value) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let Some(object) = raw.as_object() else {
            errors.push(ValidationError::new("$", "must be a JSON object"));
            return errors;
        };

        for field in ["errorId", "message", "timestamp", "url", "sessionId", "severity", "category"] {
            match object.get(field) {
                None | Some(Value::Null) => {
                    errors.push(ValidationError::new(field, "is required"));
                }
                Some(Value::String(_)) => {}
                Some(_) => errors.push(ValidationError::new(field, "must be a string")),
            }
        }

        let text = |key: &str| object.get(key).and_then(Value::as_str);

        if let Some(id) = text("errorId") {
            if id.parse::<ErrorId>().is_err() {
                errors.push(ValidationError::new("errorId", "is not a valid identifier"));
            }
        }
        if let Some(id) = text("sessionId") {
            if id.parse::<SessionId>().is_err() {
                errors.push(ValidationError::new("sessionId", "is not a valid identifier"));
            }
        }
        if let Some(ts) = text("timestamp") {
            if DateTime::parse_from_rfc3339(ts).is_err() {
                errors.push(ValidationError::new("timestamp", "is not an ISO-8601 timestamp"));
            }
        }
        if let Some(severity) = text("severity") {
            if severity.parse::<Severity>().is_err() {
                errors.push(ValidationError::new(
                    "severity",
                    format!("invalid value '{severity}'"),
                ));
            }
        }
        if let Some(category) = text("category") {
            if category.parse::<FaultCategory>().is_err() {
                errors.push(ValidationError::new(
                    "category",
                    format!("invalid value '{category}'"),
                ));
            }
        }
        if let Some(context) = object.get("additionalContext") {
            if !context.is_object() {
                errors.push(ValidationError::new("additionalContext", "must be an object"));
            }
        }

        errors
    }
}

/// Shape check for user identifiers: 1 to 128 ASCII letters, digits, `-`, `_`, `.`
pub fn is_valid_user_id(user_id: &str) -> bool {
    !user_id.is_empty()
        && user_id.len() <= 128
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
