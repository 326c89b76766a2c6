//! Per-boundary recovery state machine
//!
//! A boundary moves `Healthy -> Faulted -> (Retrying | Isolated)` and from
//! there back to `Healthy` on success or to `Exhausted` once every retry
//! has been used. Transient faults arm a one-shot auto-recovery timer that
//! is cancelled when the boundary is torn down.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use errguard_core::domain::{BoundaryId, Classification, ErrorId, FaultEvent};

use crate::isolation::IsolationStore;
use crate::policy::{auto_recovery_delay, cooldown_remaining, RecoveryPolicy};
use crate::RecoveryError;

// ============================================================================
// Public types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    #[default]
    Healthy,
    Faulted,
    Retrying,
    Isolated,
    Exhausted,
}

impl RecoveryPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryPhase::Healthy => "healthy",
            RecoveryPhase::Faulted => "faulted",
            RecoveryPhase::Retrying => "retrying",
            RecoveryPhase::Isolated => "isolated",
            RecoveryPhase::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryTrigger {
    Automatic,
    Manual,
}

/// Snapshot of a boundary's recovery state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryState {
    pub boundary: BoundaryId,
    pub phase: RecoveryPhase,
    pub retry_count: u32,
    pub max_retries: u32,
    pub is_isolated: bool,
    pub last_error_id: Option<ErrorId>,
    pub last_classification: Option<Classification>,
    pub auto_recovery_pending: bool,
}

impl RecoveryState {
    /// Whether a manual retry would currently be accepted
    pub fn can_retry(&self) -> bool {
        matches!(self.phase, RecoveryPhase::Faulted | RecoveryPhase::Isolated)
            && self.retry_count < self.max_retries
    }
}

/// What the boundary should do with a fault it just caught
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryDecision {
    pub state: RecoveryState,
    pub classification: Classification,
    /// Delay of the auto-recovery attempt armed by this fault
    pub auto_recovery_in: Option<Duration>,
    /// Whether the fault should reach ancestor boundaries
    pub propagate: bool,
}

/// Notifications emitted by a controller
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryEvent {
    AutoRecoveryScheduled {
        boundary: BoundaryId,
        delay: Duration,
    },
    /// The timer fired and a retry was started; the owner re-runs its work
    AutoRetry {
        boundary: BoundaryId,
        retry_count: u32,
    },
    AutoRetrySkipped {
        boundary: BoundaryId,
        reason: RecoveryError,
    },
    Exhausted {
        boundary: BoundaryId,
    },
    Recovered {
        boundary: BoundaryId,
    },
}

// ============================================================================
// Controller
// ============================================================================

struct AutoRecoveryTimer {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

impl AutoRecoveryTimer {
    fn cancel(self) {
        self.token.cancel();
    }
}

#[derive(Default)]
struct Inner {
    phase: RecoveryPhase,
    retry_count: u32,
    is_isolated: bool,
    last_recovery_attempt: Option<Instant>,
    last_fault: Option<(ErrorId, Classification)>,
    timer: Option<AutoRecoveryTimer>,
    torn_down: bool,
}

impl Inner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

/// Recovery state machine for one boundary instance
pub struct RecoveryController {
    boundary: BoundaryId,
    policy: RecoveryPolicy,
    inner: Mutex<Inner>,
    isolation: Option<IsolationStore>,
    events: Option<mpsc::UnboundedSender<RecoveryEvent>>,
    shutdown: CancellationToken,
    this: Weak<RecoveryController>,
}

impl RecoveryController {
    pub fn new(
        boundary: BoundaryId,
        policy: RecoveryPolicy,
        isolation: Option<IsolationStore>,
        events: Option<mpsc::UnboundedSender<RecoveryEvent>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            boundary,
            policy,
            inner: Mutex::new(Inner::default()),
            isolation,
            events,
            shutdown: CancellationToken::new(),
            this: this.clone(),
        })
    }

    pub fn boundary(&self) -> &BoundaryId {
        &self.boundary
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    pub fn state(&self) -> RecoveryState {
        let inner = self.inner.lock().unwrap();
        self.snapshot(&inner)
    }

    /// Records a caught fault and decides how the boundary reacts
    ///
    /// Nothing is incremented here. A transient fault arms the
    /// auto-recovery timer unless one is already pending.
    pub fn on_fault(
        &self,
        fault: &FaultEvent,
        classification: Classification,
    ) -> Result<RecoveryDecision, RecoveryError> {
        let (state, auto_recovery_in) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.torn_down {
                return Err(RecoveryError::TornDown);
            }
            inner.last_fault = Some((fault.id(), classification));

            let phase = if inner.retry_count >= self.policy.max_retries {
                RecoveryPhase::Exhausted
            } else if inner.is_isolated {
                RecoveryPhase::Isolated
            } else {
                RecoveryPhase::Faulted
            };
            inner.phase = phase;

            let mut armed = None;
            if phase == RecoveryPhase::Exhausted {
                inner.cancel_timer();
            } else if inner.timer.is_none() {
                if let Some(delay) = auto_recovery_delay(&classification, &self.policy) {
                    if let Some(timer) = self.schedule_auto_recovery(delay) {
                        inner.timer = Some(timer);
                        armed = Some(delay);
                    }
                }
            }
            (self.snapshot(&inner), armed)
        };

        tracing::info!(
            boundary = %self.boundary,
            error_id = %fault.id(),
            classification = %classification,
            phase = %state.phase,
            retry_count = state.retry_count,
            "Fault caught by boundary"
        );

        if state.phase == RecoveryPhase::Exhausted {
            self.emit(RecoveryEvent::Exhausted {
                boundary: self.boundary.clone(),
            });
        }
        if let Some(delay) = auto_recovery_in {
            self.emit(RecoveryEvent::AutoRecoveryScheduled {
                boundary: self.boundary.clone(),
                delay,
            });
        }

        Ok(RecoveryDecision {
            propagate: !state.is_isolated,
            classification,
            auto_recovery_in,
            state,
        })
    }

    /// Starts a manual retry
    ///
    /// Allowed while faulted with retries left. The fault is cleared
    /// optimistically; the caller re-runs its work and reports the outcome
    /// through [`on_fault`](Self::on_fault) or
    /// [`mark_recovered`](Self::mark_recovered).
    pub fn retry(&self) -> Result<RecoveryState, RecoveryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.torn_down {
            return Err(RecoveryError::TornDown);
        }
        self.begin_retry(&mut inner)
    }

    /// Starts a retry subject to the cooldown between recovery attempts
    pub fn attempt_recovery(
        &self,
        trigger: RecoveryTrigger,
    ) -> Result<RecoveryState, RecoveryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.torn_down {
            return Err(RecoveryError::TornDown);
        }

        let now = Instant::now();
        if let Some(remaining) =
            cooldown_remaining(inner.last_recovery_attempt, now, self.policy.cooldown)
        {
            tracing::debug!(
                boundary = %self.boundary,
                ?trigger,
                remaining_ms = remaining.as_millis() as u64,
                "Recovery attempt refused during cooldown"
            );
            return Err(RecoveryError::CooldownActive { remaining });
        }

        let state = self.begin_retry(&mut inner)?;
        inner.last_recovery_attempt = Some(now);
        tracing::info!(
            boundary = %self.boundary,
            ?trigger,
            retry_count = state.retry_count,
            "Recovery attempt started"
        );
        Ok(state)
    }

    /// Records that the boundary's work succeeded after a fault
    ///
    /// Counters go back to defaults and any isolation is lifted. The time
    /// of the last attempt is kept so the cooldown still applies.
    pub async fn mark_recovered(&self) {
        let was_isolated = {
            let mut inner = self.inner.lock().unwrap();
            if inner.torn_down || inner.phase == RecoveryPhase::Healthy {
                return;
            }
            let was_isolated = inner.is_isolated;
            self.clear_fault_state(&mut inner);
            was_isolated
        };

        if was_isolated {
            self.clear_isolation_marker().await;
        }
        tracing::info!(boundary = %self.boundary, "Boundary recovered");
        self.emit(RecoveryEvent::Recovered {
            boundary: self.boundary.clone(),
        });
    }

    /// Stops the fault from reaching ancestor boundaries
    ///
    /// Isolation stays in force until the fault clears or the boundary is
    /// reset.
    pub async fn isolate(&self) -> Result<RecoveryState, RecoveryError> {
        let (state, error_id) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.torn_down {
                return Err(RecoveryError::TornDown);
            }
            inner.is_isolated = true;
            if inner.phase == RecoveryPhase::Faulted {
                inner.phase = RecoveryPhase::Isolated;
            }
            let error_id = inner.last_fault.map(|(id, _)| id);
            (self.snapshot(&inner), error_id)
        };

        if let Some(isolation) = &self.isolation {
            if !isolation.mark(&self.boundary, error_id).await {
                tracing::warn!(boundary = %self.boundary, "Failed to persist isolation marker");
            }
        }
        tracing::info!(boundary = %self.boundary, "Boundary isolated");
        Ok(state)
    }

    /// Clears every counter and flag; always available
    pub async fn reset_error_boundary(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.torn_down {
                return;
            }
            self.clear_fault_state(&mut inner);
        }
        self.clear_isolation_marker().await;
        tracing::info!(boundary = %self.boundary, "Boundary reset");
    }

    /// Cancels the pending timer and ignores everything that follows
    pub fn teardown(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.torn_down = true;
            inner.cancel_timer();
        }
        self.shutdown.cancel();
        tracing::debug!(boundary = %self.boundary, "Boundary torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.lock().unwrap().torn_down
    }

    /// Token cancelled when the boundary is torn down
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn begin_retry(&self, inner: &mut Inner) -> Result<RecoveryState, RecoveryError> {
        match inner.phase {
            RecoveryPhase::Healthy => Err(RecoveryError::NotFaulted),
            RecoveryPhase::Retrying => Err(RecoveryError::RetryInProgress),
            RecoveryPhase::Exhausted => Err(RecoveryError::Exhausted {
                max_retries: self.policy.max_retries,
            }),
            RecoveryPhase::Faulted | RecoveryPhase::Isolated => {
                if inner.retry_count >= self.policy.max_retries {
                    inner.phase = RecoveryPhase::Exhausted;
                    return Err(RecoveryError::Exhausted {
                        max_retries: self.policy.max_retries,
                    });
                }
                inner.retry_count += 1;
                inner.phase = RecoveryPhase::Retrying;
                inner.cancel_timer();
                Ok(self.snapshot(inner))
            }
        }
    }

    fn clear_fault_state(&self, inner: &mut Inner) {
        inner.cancel_timer();
        inner.phase = RecoveryPhase::Healthy;
        inner.retry_count = 0;
        inner.is_isolated = false;
        inner.last_fault = None;
    }

    async fn clear_isolation_marker(&self) {
        if let Some(isolation) = &self.isolation {
            if !isolation.clear(&self.boundary).await {
                tracing::warn!(boundary = %self.boundary, "Failed to clear isolation marker");
            }
        }
    }

    fn schedule_auto_recovery(&self, delay: Duration) -> Option<AutoRecoveryTimer> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                boundary = %self.boundary,
                "No async runtime, auto-recovery not scheduled"
            );
            return None;
        };

        let token = self.shutdown.child_token();
        let task_token = token.clone();
        let controller = self.this.clone();
        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if let Some(controller) = controller.upgrade() {
                controller.fire_auto_recovery();
            }
        });

        Some(AutoRecoveryTimer {
            token,
            _handle: handle,
        })
    }

    fn fire_auto_recovery(&self) {
        self.inner.lock().unwrap().timer = None;

        let event = match self.attempt_recovery(RecoveryTrigger::Automatic) {
            Ok(state) => RecoveryEvent::AutoRetry {
                boundary: self.boundary.clone(),
                retry_count: state.retry_count,
            },
            Err(reason) => {
                tracing::debug!(boundary = %self.boundary, %reason, "Auto-recovery skipped");
                RecoveryEvent::AutoRetrySkipped {
                    boundary: self.boundary.clone(),
                    reason,
                }
            }
        };
        self.emit(event);
    }

    fn snapshot(&self, inner: &Inner) -> RecoveryState {
        RecoveryState {
            boundary: self.boundary.clone(),
            phase: inner.phase,
            retry_count: inner.retry_count,
            max_retries: self.policy.max_retries,
            is_isolated: inner.is_isolated,
            last_error_id: inner.last_fault.map(|(id, _)| id),
            last_classification: inner.last_fault.map(|(_, c)| c),
            auto_recovery_pending: inner.timer.is_some(),
        }
    }

    fn emit(&self, event: RecoveryEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

impl Drop for RecoveryController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errguard_core::domain::{classify, FaultCategory, Severity};
    use errguard_core::ports::MemoryStateStore;
    use tokio::sync::mpsc::error::TryRecvError;

    fn boundary() -> BoundaryId {
        BoundaryId::new("app/dashboard").unwrap()
    }

    fn controller_with_events() -> (
        Arc<RecoveryController>,
        mpsc::UnboundedReceiver<RecoveryEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller =
            RecoveryController::new(boundary(), RecoveryPolicy::default(), None, Some(tx));
        (controller, rx)
    }

    fn fault(message: &str) -> (FaultEvent, Classification) {
        let event = FaultEvent::new(message);
        let classification = classify(event.message(), event.stack_trace());
        (event, classification)
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_fault_auto_recovers_once_after_three_seconds() {
        let (controller, mut rx) = controller_with_events();
        let (event, classification) = fault("Failed to fetch data from server");
        assert_eq!(
            classification,
            Classification::new(FaultCategory::Network, Severity::High)
        );

        let decision = controller.on_fault(&event, classification).unwrap();
        assert_eq!(decision.state.phase, RecoveryPhase::Faulted);
        assert_eq!(decision.state.retry_count, 0);
        assert_eq!(decision.auto_recovery_in, Some(Duration::from_secs(3)));
        assert!(decision.propagate);
        assert!(matches!(
            rx.try_recv(),
            Ok(RecoveryEvent::AutoRecoveryScheduled { .. })
        ));

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            rx.try_recv(),
            Ok(RecoveryEvent::AutoRetry {
                boundary: boundary(),
                retry_count: 1
            })
        );
        assert_eq!(controller.state().phase, RecoveryPhase::Retrying);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_recovery_respects_cooldown() {
        let (controller, mut rx) = controller_with_events();
        let (event, classification) = fault("Network request timed out");

        controller.on_fault(&event, classification).unwrap();
        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(controller.state().retry_count, 1);

        // The retried work faults again straight away
        let (again, classification) = fault("Network request timed out");
        let decision = controller.on_fault(&again, classification).unwrap();
        assert_eq!(decision.state.phase, RecoveryPhase::Faulted);
        assert!(decision.auto_recovery_in.is_some());

        tokio::time::sleep(Duration::from_secs(4)).await;
        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events.iter().any(|e| matches!(
            e,
            RecoveryEvent::AutoRetrySkipped {
                reason: RecoveryError::CooldownActive { .. },
                ..
            }
        )));
        assert_eq!(controller.state().retry_count, 1);

        assert!(matches!(
            controller.attempt_recovery(RecoveryTrigger::Manual),
            Err(RecoveryError::CooldownActive { .. })
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        let state = controller
            .attempt_recovery(RecoveryTrigger::Manual)
            .unwrap();
        assert_eq!(state.retry_count, 2);
    }

    #[tokio::test]
    async fn test_retry_count_bounded_by_max_retries() {
        let (controller, _rx) = controller_with_events();
        let max = controller.policy().max_retries;

        for n in 1..=max {
            let (event, classification) = fault("undefined is not a function");
            let decision = controller.on_fault(&event, classification).unwrap();
            assert!(decision.state.can_retry());

            let state = controller.retry().unwrap();
            assert_eq!(state.retry_count, n);
            assert_eq!(state.phase, RecoveryPhase::Retrying);
        }

        let (event, classification) = fault("undefined is not a function");
        let decision = controller.on_fault(&event, classification).unwrap();
        assert_eq!(decision.state.phase, RecoveryPhase::Exhausted);
        assert!(!decision.state.can_retry());

        assert_eq!(
            controller.retry(),
            Err(RecoveryError::Exhausted { max_retries: max })
        );
        assert_eq!(controller.state().retry_count, max);

        // Reset is always available
        controller.reset_error_boundary().await;
        let state = controller.state();
        assert_eq!(state.phase, RecoveryPhase::Healthy);
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test]
    async fn test_retry_refused_when_healthy_or_in_progress() {
        let (controller, _rx) = controller_with_events();
        assert_eq!(controller.retry(), Err(RecoveryError::NotFaulted));

        let (event, classification) = fault("Cannot read properties of undefined");
        controller.on_fault(&event, classification).unwrap();
        controller.retry().unwrap();
        assert_eq!(controller.retry(), Err(RecoveryError::RetryInProgress));

        controller.mark_recovered().await;
        let state = controller.state();
        assert_eq!(state.phase, RecoveryPhase::Healthy);
        assert_eq!(state.retry_count, 0);
    }

    #[tokio::test]
    async fn test_isolation_persists_marker_and_stops_propagation() {
        let store = Arc::new(MemoryStateStore::new());
        let isolation = IsolationStore::new(store);
        let controller = RecoveryController::new(
            boundary(),
            RecoveryPolicy::default(),
            Some(isolation.clone()),
            None,
        );

        let (event, classification) = fault("Cannot read properties of undefined");
        controller.on_fault(&event, classification).unwrap();
        let state = controller.isolate().await.unwrap();
        assert!(state.is_isolated);
        assert_eq!(state.phase, RecoveryPhase::Isolated);

        let markers = isolation.list().await;
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].error_id, Some(event.id()));

        let (again, classification) = fault("Cannot read properties of undefined");
        let decision = controller.on_fault(&again, classification).unwrap();
        assert!(!decision.propagate);
        assert_eq!(decision.state.phase, RecoveryPhase::Isolated);

        controller.retry().unwrap();
        controller.mark_recovered().await;
        assert!(!controller.state().is_isolated);
        assert!(!isolation.is_isolated(&boundary()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_pending_timer() {
        let (controller, mut rx) = controller_with_events();
        let (event, classification) = fault("ECONNREFUSED");
        controller.on_fault(&event, classification).unwrap();
        assert!(controller.state().auto_recovery_pending);

        controller.teardown();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RecoveryEvent::AutoRecoveryScheduled { .. }));
        assert_eq!(controller.state().retry_count, 0);
        assert_eq!(
            controller.on_fault(&event, classification).unwrap_err(),
            RecoveryError::TornDown
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_retry_cancels_auto_recovery() {
        let (controller, mut rx) = controller_with_events();
        let (event, classification) = fault("Invalid input: name is required");
        let decision = controller.on_fault(&event, classification).unwrap();
        assert_eq!(decision.auto_recovery_in, Some(Duration::from_secs(1)));

        controller.retry().unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(!events
            .iter()
            .any(|e| matches!(e, RecoveryEvent::AutoRetry { .. })));
        assert_eq!(controller.state().retry_count, 1);
    }
}
