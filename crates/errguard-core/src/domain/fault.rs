//! Fault events
//!
//! A [`FaultEvent`] is the raw record handed to the subsystem by an
//! interception boundary. It is created once at interception time and
//! never mutated afterwards; consumers take it by reference.
//!
//! [`FaultIntake`] is the inbound wire shape:
//! `{ "error": { "message", "stack"? }, "componentTrace"?, "context"? }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::newtypes::ErrorId;

/// Open-ended diagnostic data attached to a fault
pub type FaultContext = Map<String, Value>;

/// A fault intercepted by a boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultEvent {
    id: ErrorId,
    timestamp: DateTime<Utc>,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nested_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    component_name: Option<String>,
    #[serde(default)]
    context: FaultContext,
}

impl FaultEvent {
    /// Creates a new fault with a fresh id and the current time
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            id: ErrorId::new(),
            timestamp: Utc::now(),
            message: message.into(),
            stack_trace: None,
            nested_trace: None,
            component_name: None,
            context: FaultContext::new(),
        }
    }

    /// Sets the stack trace
    pub fn with_stack_trace(mut self, stack: impl Into<String>) -> Self {
        self.stack_trace = Some(stack.into());
        self
    }

    /// Sets the nested (component) call trace
    pub fn with_nested_trace(mut self, trace: impl Into<String>) -> Self {
        self.nested_trace = Some(trace.into());
        self
    }

    /// Sets the originating component name
    pub fn with_component(mut self, name: impl Into<String>) -> Self {
        self.component_name = Some(name.into());
        self
    }

    /// Adds a single context entry
    pub fn with_context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Replaces the whole context map
    pub fn with_context(mut self, context: FaultContext) -> Self {
        self.context = context;
        self
    }

    /// Overrides the timestamp (replaying recorded faults, tests)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Overrides the id (replaying recorded faults)
    pub fn with_id(mut self, id: ErrorId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> ErrorId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn stack_trace(&self) -> Option<&str> {
        self.stack_trace.as_deref()
    }

    pub fn nested_trace(&self) -> Option<&str> {
        self.nested_trace.as_deref()
    }

    pub fn component_name(&self) -> Option<&str> {
        self.component_name.as_deref()
    }

    pub fn context(&self) -> &FaultContext {
        &self.context
    }
}

// ============================================================================
// Inbound intake
// ============================================================================

/// Error part of an inbound fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Inbound fault as received from an interception boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultIntake {
    pub error: IntakeError,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_trace: Option<String>,
    /// Name of the component that raised the fault, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<FaultContext>,
    /// Recorded timestamp; intake time is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<FaultIntake> for FaultEvent {
    fn from(intake: FaultIntake) -> Self {
        let mut event = FaultEvent::new(intake.error.message);
        event.stack_trace = intake.error.stack;
        event.nested_trace = intake.component_trace;
        event.component_name = intake.component_name;
        if let Some(context) = intake.context {
            event.context = context;
        }
        if let Some(timestamp) = intake.timestamp {
            event.timestamp = timestamp;
        }
        event
    }
}
