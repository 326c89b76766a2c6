//! Fault interception boundary
//!
//! A [`FaultBoundary`] runs a unit of work and turns panics (and, through
//! [`FaultBoundary::run_fallible`], returned errors) into [`FaultEvent`]s
//! handed to the [`ErrorGuard`]. Boundaries are named with `/`-separated
//! paths; a fault propagates to the parent path unless the boundary is
//! isolated.

use std::fmt::Display;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::json;

use errguard_core::domain::{BoundaryId, ErrorId, FaultEvent};
use errguard_recovery::{RecoveryController, RecoveryError, RecoveryState, RecoveryTrigger};
use errguard_report::ReportContext;

use crate::guard::{ErrorGuard, FaultOutcome};
use crate::panic_hook::{panic_message, take_last_panic};

/// A fault caught by a boundary, after it was routed through the guard
#[derive(Debug, thiserror::Error)]
#[error("boundary '{boundary}' caught fault {error_id}: {message}")]
pub struct CaughtFault {
    pub boundary: BoundaryId,
    pub error_id: ErrorId,
    pub message: String,
    pub outcome: FaultOutcome,
}

pub struct FaultBoundary {
    guard: Arc<ErrorGuard>,
    id: BoundaryId,
    component: Option<String>,
    context: ReportContext,
}

impl FaultBoundary {
    pub fn new(guard: Arc<ErrorGuard>, id: BoundaryId) -> Self {
        Self {
            guard,
            id,
            component: None,
            context: ReportContext::new(),
        }
    }

    /// Component name recorded on every fault caught here
    pub fn with_component(mut self, name: impl Into<String>) -> Self {
        self.component = Some(name.into());
        self
    }

    /// Ambient context used for reports generated here
    pub fn with_context(mut self, context: ReportContext) -> Self {
        self.context = context;
        self
    }

    pub fn id(&self) -> &BoundaryId {
        &self.id
    }

    pub fn controller(&self) -> Arc<RecoveryController> {
        self.guard.recovery().get_or_create(&self.id)
    }

    pub fn state(&self) -> RecoveryState {
        self.controller().state()
    }

    /// Runs `work`, converting a panic into a fault
    pub async fn run<F, T>(&self, work: F) -> Result<T, Box<CaughtFault>>
    where
        F: FnOnce() -> T,
    {
        match catch_unwind(AssertUnwindSafe(work)) {
            Ok(value) => {
                self.controller().mark_recovered().await;
                Ok(value)
            }
            Err(payload) => {
                let mut fault = FaultEvent::new(panic_message(payload.as_ref()));
                if let Some(details) = take_last_panic() {
                    fault = fault.with_stack_trace(details.backtrace);
                    if let Some(location) = details.location {
                        fault = fault.with_context_value("panicLocation", json!(location));
                    }
                }
                Err(self.intercept(fault).await)
            }
        }
    }

    /// Runs `work`, converting both panics and returned errors into faults
    pub async fn run_fallible<F, T, E>(&self, work: F) -> Result<T, Box<CaughtFault>>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        match self.run(work).await? {
            Ok(value) => Ok(value),
            Err(e) => Err(self.intercept(FaultEvent::new(e.to_string())).await),
        }
    }

    /// Runs `work` on its own task; a panic inside it becomes a fault
    pub async fn run_async<Fut, T>(&self, work: Fut) -> Result<T, Box<CaughtFault>>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(work).await {
            Ok(value) => {
                self.controller().mark_recovered().await;
                Ok(value)
            }
            Err(e) if e.is_panic() => {
                let payload = e.into_panic();
                Err(self
                    .intercept(FaultEvent::new(panic_message(payload.as_ref())))
                    .await)
            }
            Err(e) => Err(self
                .intercept(FaultEvent::new(format!("Task failed: {e}")))
                .await),
        }
    }

    /// Manual retry of the boundary's work
    pub fn retry(&self) -> Result<RecoveryState, RecoveryError> {
        self.controller().attempt_recovery(RecoveryTrigger::Manual)
    }

    /// Escape hatch once retries are exhausted
    pub async fn reset(&self) {
        self.controller().reset_error_boundary().await;
    }

    pub async fn isolate(&self) -> Result<RecoveryState, RecoveryError> {
        self.controller().isolate().await
    }

    async fn intercept(&self, mut fault: FaultEvent) -> Box<CaughtFault> {
        if let Some(component) = &self.component {
            fault = fault.with_component(component.clone());
        }
        let outcome = self.guard.handle_fault(&self.id, &fault, &self.context).await;
        Box::new(CaughtFault {
            boundary: self.id.clone(),
            error_id: fault.id(),
            message: fault.message().to_string(),
            outcome,
        })
    }
}

impl Drop for FaultBoundary {
    fn drop(&mut self) {
        self.guard.recovery().remove(&self.id);
    }
}
