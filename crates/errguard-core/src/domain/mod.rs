//! Domain entities and pure domain logic
//!
//! This module contains:
//! - Identifier newtypes (`ErrorId`, `SessionId`, `BoundaryId`)
//! - `FaultEvent` and the inbound intake shape
//! - Fault classification (generic and authentication-specific)
//! - The consent table and consent configuration
//! - Report records, queue bookkeeping and report validation
//! - Alert configuration

pub mod alert;
pub mod auth_fault;
pub mod classification;
pub mod consent;
pub mod errors;
pub mod fault;
pub mod newtypes;
pub mod report;
pub mod validation;

pub use alert::{AlertChannel, AlertConfig};
pub use auth_fault::{classify_auth_fault, AuthClassification, AuthFaultKind};
pub use classification::{classify, Classification, FaultCategory, Severity};
pub use consent::{
    merge_overrides, ConsentConfig, ConsentLevel, ConsentOverrides, DataType,
    CURRENT_CONSENT_VERSION,
};
pub use errors::DomainError;
pub use fault::{FaultContext, FaultEvent, FaultIntake};
pub use newtypes::{BoundaryId, ErrorId, SessionId};
pub use report::{ReportRecord, ReportStatus, StoredReport, SubmissionResponse};
pub use validation::{ReportValidator, ValidationError, ValidationLimits};
