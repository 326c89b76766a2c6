//! errguard Recovery - Per-boundary fault recovery
//!
//! Each fault boundary owns a [`RecoveryController`] that tracks:
//! - the boundary's phase (healthy, faulted, retrying, isolated, exhausted)
//! - bounded manual retries
//! - a single pending auto-recovery timer for transient faults
//! - the cooldown between recovery attempts
//!
//! [`RecoveryRegistry`] creates controllers on first fault and tears them
//! down with their boundary.

pub mod controller;
pub mod isolation;
pub mod policy;
pub mod registry;

pub use controller::{
    RecoveryController, RecoveryDecision, RecoveryEvent, RecoveryPhase, RecoveryState,
    RecoveryTrigger,
};
pub use isolation::{IsolationMarker, IsolationStore};
pub use policy::{auto_recovery_delay, cooldown_remaining, retry_backoff, RecoveryPolicy};
pub use registry::RecoveryRegistry;

use std::time::Duration;

/// Errors returned when a recovery action is refused
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    /// Every allowed retry has been used
    #[error("Retry limit reached ({max_retries} attempts)")]
    Exhausted { max_retries: u32 },

    /// A retry is already running for this boundary
    #[error("A retry is already in progress")]
    RetryInProgress,

    /// The previous recovery attempt was too recent
    #[error("Recovery cooldown active for another {}s", remaining.as_secs())]
    CooldownActive { remaining: Duration },

    /// The boundary has no fault to recover from
    #[error("Boundary is not faulted")]
    NotFaulted,

    /// The boundary was torn down
    #[error("Boundary has been torn down")]
    TornDown,
}
