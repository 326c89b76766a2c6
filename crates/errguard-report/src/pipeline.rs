//! Report pipeline
//!
//! Submission runs in a fixed order:
//! 1. build the record from the fault and the ambient context, keeping
//!    only what the user's consent allows
//! 2. sanitize every free-form field
//! 3. truncate message and stacks, and cap oversized context
//! 4. validate, rejecting structurally invalid records
//! 5. persist to the capped pending queue
//! 6. deliver when external reporting is allowed; on failure file the
//!    record in the failed queue and offer a mail fallback
//!
//! Submission is idempotent per `errorId`: a submission for an id that is
//! already in flight or already delivered is a no-op.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashSet;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use errguard_core::config::ReportingConfig;
use errguard_core::domain::report::RemoteAck;
use errguard_core::domain::validation::is_valid_user_id;
use errguard_core::domain::{
    classify, DataType, ErrorId, FaultContext, FaultEvent, ReportRecord, ReportStatus,
    ReportValidator, SessionId, StoredReport, SubmissionResponse,
};
use errguard_core::ports::{keys, IStateStore, ITransport};
use errguard_privacy::{ConsentManager, Sanitizer};
use errguard_recovery::retry_backoff;

use crate::actions::{UserAction, UserActionLog};
use crate::fallback::mailto_link;
use crate::queue::ReportQueue;
use crate::system_info::SystemInfo;
use crate::ReportError;

// ============================================================================
// Inputs and outcomes
// ============================================================================

/// Ambient context supplied by the host when a report is generated
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub url: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: Option<String>,
    pub extra: FaultContext,
}

impl ReportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Outcome of [`ReportPipeline::submit_report`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    /// Accepted by the reporting endpoint
    Delivered { report_id: Option<String> },
    /// Persisted locally; delivery is not allowed or not configured
    StoredLocally,
    /// Delivery failed; the record waits in the failed queue
    Failed {
        error: String,
        fallback_url: Option<String>,
    },
    /// The same `errorId` is in flight or was already delivered
    Duplicate,
}

impl SubmissionResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, SubmissionResult::Failed { .. })
    }

    /// Wire form returned to the host
    pub fn to_response(&self) -> SubmissionResponse {
        match self {
            SubmissionResult::Delivered { report_id } => SubmissionResponse {
                success: true,
                report_id: report_id.clone(),
                error: None,
                fallback_url: None,
            },
            SubmissionResult::StoredLocally | SubmissionResult::Duplicate => SubmissionResponse {
                success: true,
                report_id: None,
                error: None,
                fallback_url: None,
            },
            SubmissionResult::Failed {
                error,
                fallback_url,
            } => SubmissionResponse {
                success: false,
                report_id: None,
                error: Some(error.clone()),
                fallback_url: fallback_url.clone(),
            },
        }
    }
}

/// Outcome of [`ReportPipeline::retry_failed`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RetrySummary {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Removes its id from the in-flight set when dropped
struct InFlight<'a> {
    set: &'a DashSet<ErrorId>,
    id: ErrorId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

pub struct ReportPipeline {
    config: ReportingConfig,
    consent: Arc<ConsentManager>,
    sanitizer: Arc<Sanitizer>,
    validator: ReportValidator,
    queue: ReportQueue,
    actions: UserActionLog,
    session: Arc<dyn IStateStore>,
    session_id: OnceCell<SessionId>,
    transport: Option<Arc<dyn ITransport>>,
    system_info: SystemInfo,
    in_flight: DashSet<ErrorId>,
}

impl ReportPipeline {
    /// Creates a pipeline persisting to `store` and caching the session id
    /// in `session`
    pub fn new(
        config: ReportingConfig,
        consent: Arc<ConsentManager>,
        sanitizer: Arc<Sanitizer>,
        store: Arc<dyn IStateStore>,
        session: Arc<dyn IStateStore>,
    ) -> Self {
        Self {
            queue: ReportQueue::new(store.clone(), config.max_queue_size),
            actions: UserActionLog::new(store, config.max_user_actions),
            config,
            consent,
            sanitizer,
            validator: ReportValidator::default(),
            session,
            session_id: OnceCell::new(),
            transport: None,
            system_info: SystemInfo::collect(),
            in_flight: DashSet::new(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn ITransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_validator(mut self, validator: ReportValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    pub fn queue(&self) -> &ReportQueue {
        &self.queue
    }

    pub fn actions(&self) -> &UserActionLog {
        &self.actions
    }

    pub fn consent(&self) -> &Arc<ConsentManager> {
        &self.consent
    }

    /// Identifier of the current session, generated and cached on first use
    pub async fn session_id(&self) -> SessionId {
        *self
            .session_id
            .get_or_init(|| async {
                if let Ok(Some(raw)) = self.session.get(keys::SESSION_ID).await {
                    if let Ok(id) = raw.trim().parse::<SessionId>() {
                        return id;
                    }
                }
                let id = SessionId::new();
                if let Err(e) = self.session.set(keys::SESSION_ID, &id.to_string()).await {
                    tracing::warn!(error = %e, "Failed to cache session id");
                }
                id
            })
            .await
    }

    /// Records a user interaction if the user consented to it
    pub async fn record_user_action(&self, action: &str, target: Option<&str>) {
        if !self.consent.is_data_type_allowed(DataType::UserActions).await {
            return;
        }
        let action = self.sanitizer.sanitize_string(action);
        let target = target.map(|t| self.sanitizer.sanitize_string(t));
        self.actions.record(UserAction::new(action, target)).await;
    }

    /// Builds a report record from a fault
    ///
    /// Stack traces, user id, system info and user actions are included
    /// only when the corresponding consent is in force.
    pub async fn generate_report(&self, fault: &FaultEvent, context: &ReportContext) -> ReportRecord {
        let consent = self.consent.effective_config().await;
        let allows = |data_type: DataType| consent.as_ref().is_some_and(|c| c.allows(data_type));
        let classification = classify(fault.message(), fault.stack_trace());

        let mut additional = fault.context().clone();
        for (key, value) in &context.extra {
            additional.insert(key.clone(), value.clone());
        }
        if let Some(component) = fault.component_name() {
            additional
                .entry("componentName")
                .or_insert_with(|| json!(component));
        }
        if allows(DataType::SystemInfo) {
            additional.insert("systemInfo".to_string(), self.system_info.to_value());
        }
        if allows(DataType::UserActions) {
            let actions = self.actions.recent().await;
            if !actions.is_empty() {
                additional.insert(
                    "userActions".to_string(),
                    serde_json::to_value(actions).unwrap_or_default(),
                );
            }
        }

        let stack_allowed = allows(DataType::StackTraces);
        let user_id = context
            .user_id
            .as_deref()
            .filter(|_| allows(DataType::PersonalInfo))
            .filter(|id| is_valid_user_id(id))
            .map(String::from);

        ReportRecord {
            error_id: fault.id(),
            message: fault.message().to_string(),
            stack: fault.stack_trace().filter(|_| stack_allowed).map(String::from),
            component_stack: fault
                .nested_trace()
                .filter(|_| stack_allowed)
                .map(String::from),
            timestamp: fault.timestamp(),
            url: context
                .url
                .clone()
                .unwrap_or_else(|| self.config.app_url.clone()),
            user_agent: context
                .user_agent
                .clone()
                .unwrap_or_else(|| self.config.user_agent.clone()),
            session_id: self.session_id().await,
            user_id,
            severity: classification.severity,
            category: classification.category,
            user_description: None,
            additional_context: additional,
        }
    }

    /// Validates, sanitizes, persists and (if allowed) delivers a report
    pub async fn submit_report(
        &self,
        mut record: ReportRecord,
        user_description: Option<&str>,
    ) -> Result<SubmissionResult, ReportError> {
        let error_id = record.error_id;
        let Some(_in_flight) = self.begin(error_id) else {
            tracing::debug!(error_id = %error_id, "Submission already in flight");
            return Ok(SubmissionResult::Duplicate);
        };
        if let Some(existing) = self.queue.find(error_id).await {
            if existing.status == ReportStatus::Sent {
                tracing::debug!(error_id = %error_id, "Report already delivered");
                return Ok(SubmissionResult::Duplicate);
            }
        }

        if let Some(description) = user_description.map(str::trim).filter(|d| !d.is_empty()) {
            record.user_description = Some(description.to_string());
        }

        self.sanitizer.sanitize_report(&mut record);
        record.truncate();
        record.cap_context(self.validator.limits().max_context_bytes);

        let errors = self.validator.validate(&record);
        if !errors.is_empty() {
            tracing::warn!(error_id = %error_id, errors = errors.len(), "Report failed validation");
            return Err(ReportError::Validation(errors));
        }

        if let Err(e) = self.save_report_locally(&record).await {
            tracing::warn!(error_id = %error_id, error = %e, "Continuing without local copy");
        }

        if !self.consent.is_reporting_allowed().await {
            tracing::info!(error_id = %error_id, "External reporting not allowed, report kept locally");
            return Ok(SubmissionResult::StoredLocally);
        }
        if self.transport.is_none() || self.config.endpoint.is_none() {
            tracing::debug!(error_id = %error_id, "No reporting endpoint, report kept locally");
            return Ok(SubmissionResult::StoredLocally);
        }

        match self.deliver(&record).await {
            Ok(report_id) => {
                self.queue.mark_sent(error_id, report_id.clone()).await;
                tracing::info!(error_id = %error_id, ?report_id, "Report delivered");
                Ok(SubmissionResult::Delivered { report_id })
            }
            Err(e) => {
                let error = e.to_string();
                self.queue.mark_failed(&record, &error).await;
                let fallback_url = mailto_link(&self.config.support_email, &record, &error);
                tracing::warn!(error_id = %error_id, error = %error, "Report delivery failed");
                Ok(SubmissionResult::Failed {
                    error,
                    fallback_url,
                })
            }
        }
    }

    /// Runs [`submit_report`](Self::submit_report) on its own task
    ///
    /// The submission is never aborted, but once `owner` is cancelled the
    /// returned handle resolves to `None` and the outcome is dropped.
    pub fn submit_report_scoped(
        self: &Arc<Self>,
        record: ReportRecord,
        user_description: Option<String>,
        owner: CancellationToken,
    ) -> JoinHandle<Option<Result<SubmissionResult, ReportError>>> {
        let pipeline = Arc::clone(self);
        let error_id = record.error_id;
        tokio::spawn(async move {
            let submission = tokio::spawn(async move {
                pipeline
                    .submit_report(record, user_description.as_deref())
                    .await
            });
            tokio::select! {
                biased;
                _ = owner.cancelled() => {
                    tracing::debug!(error_id = %error_id, "Owner torn down, ignoring submission outcome");
                    None
                }
                joined = submission => match joined {
                    Ok(result) => Some(result),
                    Err(e) => {
                        tracing::warn!(error_id = %error_id, error = %e, "Submission task failed");
                        None
                    }
                },
            }
        })
    }

    /// Persists a record to the pending queue and applies data retention
    pub async fn save_report_locally(&self, record: &ReportRecord) -> Result<(), ReportError> {
        let now = Utc::now();
        if !self
            .queue
            .upsert_pending(StoredReport::pending(record.clone(), now))
            .await
        {
            return Err(ReportError::Storage(
                "could not write the pending queue".to_string(),
            ));
        }
        if let Some(consent) = self.consent.effective_config().await {
            self.queue
                .purge_older_than(consent.data_retention_days, now)
                .await;
        }
        Ok(())
    }

    /// Re-attempts delivery of every report in the failed queue
    pub async fn retry_failed(&self) -> RetrySummary {
        let mut summary = RetrySummary::default();
        if !self.consent.is_reporting_allowed().await {
            tracing::info!("External reporting not allowed, failed reports not retried");
            return summary;
        }

        for stored in self.queue.failed().await {
            let error_id = stored.error_id();
            let Some(_in_flight) = self.begin(error_id) else {
                continue;
            };
            summary.attempted += 1;
            match self.deliver(&stored.record).await {
                Ok(report_id) => {
                    self.queue.mark_sent(error_id, report_id).await;
                    summary.delivered += 1;
                }
                Err(e) => {
                    self.queue.mark_failed(&stored.record, &e.to_string()).await;
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            attempted = summary.attempted,
            delivered = summary.delivered,
            failed = summary.failed,
            "Retried failed reports"
        );
        summary
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn begin(&self, id: ErrorId) -> Option<InFlight<'_>> {
        self.in_flight.insert(id).then(|| InFlight {
            set: &self.in_flight,
            id,
        })
    }

    async fn deliver(&self, record: &ReportRecord) -> Result<Option<String>, ReportError> {
        let (Some(transport), Some(endpoint)) = (&self.transport, &self.config.endpoint) else {
            return Err(ReportError::Transport(
                "no reporting endpoint configured".to_string(),
            ));
        };
        let body = serde_json::to_value(record)
            .map_err(|e| ReportError::Transport(format!("could not encode report: {e}")))?;

        let attempts = self.config.max_retries.max(1);
        let base = self.config.retry_delay();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match transport.post_json(endpoint, &body).await {
                Ok(response) if response.is_success() => {
                    let ack = response
                        .body
                        .and_then(|b| serde_json::from_value::<RemoteAck>(b).ok());
                    match ack {
                        Some(ack) if !ack.success => {
                            last_error = "endpoint rejected the report".to_string();
                        }
                        Some(ack) => return Ok(ack.report_id),
                        None => return Ok(None),
                    }
                }
                Ok(response) => last_error = format!("HTTP {}", response.status),
                Err(e) => last_error = e.to_string(),
            }

            tracing::warn!(
                error_id = %record.error_id,
                attempt,
                max_attempts = attempts,
                error = %last_error,
                "Report delivery attempt failed"
            );
            if attempt < attempts {
                tokio::time::sleep(retry_backoff(attempt, base, base * 8)).await;
            }
        }

        Err(ReportError::Transport(last_error))
    }
}
