//! errguard Report - Diagnostic report pipeline
//!
//! Turns faults into sanitized, consent-filtered [`ReportRecord`]s, keeps
//! them in capped local queues and delivers them to the reporting endpoint.
//!
//! [`ReportRecord`]: errguard_core::domain::ReportRecord

pub mod actions;
pub mod fallback;
pub mod pipeline;
pub mod queue;
pub mod system_info;
pub mod transport;

pub use actions::{UserAction, UserActionLog};
pub use fallback::mailto_link;
pub use pipeline::{ReportContext, ReportPipeline, RetrySummary, SubmissionResult};
pub use queue::ReportQueue;
pub use system_info::SystemInfo;
pub use transport::HttpTransport;

use errguard_core::domain::ValidationError;

/// Errors surfaced to callers of the report pipeline
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// The record is structurally invalid and was not persisted
    #[error("Report rejected: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// The reporting endpoint could not be reached or refused the report
    #[error("Report delivery failed: {0}")]
    Transport(String),

    /// Local persistence failed
    #[error("Report storage failed: {0}")]
    Storage(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
