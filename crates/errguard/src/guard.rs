//! Composition root
//!
//! [`ErrorGuard`] builds every service from one [`Config`] and routes each
//! intercepted fault through monitoring, recovery, logging and reporting.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde_json::{json, Map};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use errguard_cache::{DatabasePool, SqliteStateStore};
use errguard_core::config::Config;
use errguard_core::domain::{BoundaryId, Classification, FaultEvent, ReportRecord};
use errguard_core::ports::{IStateStore, ITransport, MemoryStateStore};
use errguard_logging::Logger;
use errguard_monitor::{MetricsRegistry, MonitoringService, TrackedError};
use errguard_privacy::{ConsentManager, Sanitizer, SanitizerConfig};
use errguard_recovery::{
    IsolationStore, RecoveryDecision, RecoveryEvent, RecoveryPolicy, RecoveryRegistry,
};
use errguard_report::{HttpTransport, ReportContext, ReportError, ReportPipeline, SubmissionResult};

/// Handle of a background report submission
pub type SubmissionHandle = JoinHandle<Option<Result<SubmissionResult, ReportError>>>;

/// Everything that happened to one intercepted fault
#[derive(Debug)]
pub struct FaultOutcome {
    pub tracked: TrackedError,
    /// `None` once the boundary has been torn down
    pub decision: Option<RecoveryDecision>,
    /// Ancestor boundary that should also see the fault
    pub propagate_to: Option<BoundaryId>,
    pub report: ReportRecord,
    pub submission: SubmissionHandle,
}

pub struct ErrorGuard {
    config: Config,
    pool: Option<DatabasePool>,
    store: Arc<dyn IStateStore>,
    sanitizer: Arc<Sanitizer>,
    consent: Arc<ConsentManager>,
    logger: Arc<Logger>,
    pipeline: Arc<ReportPipeline>,
    recovery: RecoveryRegistry,
    monitor: MonitoringService,
    metrics: Arc<MetricsRegistry>,
    events: Mutex<Option<mpsc::UnboundedReceiver<RecoveryEvent>>>,
    shutdown: CancellationToken,
}

impl ErrorGuard {
    /// Opens persistent storage and the HTTP transport described by `config`
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let pool = if config.storage.in_memory {
            DatabasePool::in_memory().await
        } else {
            DatabasePool::new(&config.storage.database_path).await
        }
        .context("Failed to open state database")?;
        let store: Arc<dyn IStateStore> = Arc::new(SqliteStateStore::new(pool.pool().clone()));

        let transport = HttpTransport::new(
            config.reporting.request_timeout(),
            &config.reporting.user_agent,
        )
        .context("Failed to build HTTP transport")?;

        let mut guard = Self::from_parts(config, store, Some(Arc::new(transport)))?;
        guard.pool = Some(pool);
        Ok(guard)
    }

    /// Wires the services over an existing store and optional transport
    ///
    /// Must be called inside a Tokio runtime: the logger flush task starts
    /// immediately.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn IStateStore>,
        transport: Option<Arc<dyn ITransport>>,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
        let sanitizer = Arc::new(Sanitizer::new(SanitizerConfig::from(&config.privacy)));
        let consent = Arc::new(ConsentManager::with_version(
            store.clone(),
            config.privacy.consent_version.clone(),
        ));

        let logger = Arc::new(
            Logger::new(config.logging.clone(), Some(store.clone()), transport.clone())
                .with_sanitizer(sanitizer.clone()),
        );
        logger.start();

        let mut pipeline = ReportPipeline::new(
            config.reporting.clone(),
            consent.clone(),
            sanitizer.clone(),
            store.clone(),
            Arc::new(MemoryStateStore::new()),
        );
        let mut monitor = MonitoringService::new(&config.monitoring).with_metrics(metrics.clone());
        if let Some(transport) = transport {
            pipeline = pipeline.with_transport(transport.clone());
            monitor = monitor.with_transport(transport);
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let recovery = RecoveryRegistry::new(RecoveryPolicy::from(&config.recovery))
            .with_isolation(IsolationStore::new(store.clone()))
            .with_events(events_tx);

        tracing::info!("errguard initialized");

        Ok(Self {
            config,
            pool: None,
            store,
            sanitizer,
            consent,
            logger,
            pipeline: Arc::new(pipeline),
            recovery,
            monitor,
            metrics,
            events: Mutex::new(Some(events_rx)),
            shutdown: CancellationToken::new(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn IStateStore> {
        &self.store
    }

    pub fn sanitizer(&self) -> &Arc<Sanitizer> {
        &self.sanitizer
    }

    pub fn consent(&self) -> &Arc<ConsentManager> {
        &self.consent
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    pub fn pipeline(&self) -> &Arc<ReportPipeline> {
        &self.pipeline
    }

    pub fn recovery(&self) -> &RecoveryRegistry {
        &self.recovery
    }

    pub fn monitor(&self) -> &MonitoringService {
        &self.monitor
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Receiver of recovery notifications; available once
    pub fn take_recovery_events(&self) -> Option<mpsc::UnboundedReceiver<RecoveryEvent>> {
        self.events.lock().unwrap().take()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ========================================================================
    // Fault handling
    // ========================================================================

    /// Routes a fault caught by `boundary` through every service
    ///
    /// The report is submitted in the background. Its outcome is dropped
    /// once the boundary is torn down, either on its own or by
    /// [`shutdown`](Self::shutdown).
    pub async fn handle_fault(
        &self,
        boundary: &BoundaryId,
        fault: &FaultEvent,
        context: &ReportContext,
    ) -> FaultOutcome {
        let tracked = self.monitor.track_error(fault).await;
        let classification = Classification::new(tracked.category, tracked.severity);

        let controller = self.recovery.get_or_create(boundary);
        let decision = match controller.on_fault(fault, classification) {
            Ok(decision) => Some(decision),
            Err(e) => {
                tracing::debug!(boundary = %boundary, error = %e, "Fault ignored by recovery");
                None
            }
        };
        let propagate_to = match &decision {
            Some(d) if d.propagate => self.recovery.propagation_target(boundary),
            _ => None,
        };

        let mut log_context = Map::new();
        log_context.insert("errorId".to_string(), json!(fault.id().to_string()));
        log_context.insert("boundary".to_string(), json!(boundary.as_str()));
        log_context.insert("category".to_string(), json!(classification.category));
        log_context.insert("severity".to_string(), json!(classification.severity));
        self.logger.error(fault.message(), Some(log_context)).await;

        let report = self.pipeline.generate_report(fault, context).await;
        let submission = self.pipeline.submit_report_scoped(
            report.clone(),
            None,
            controller.cancellation_token().child_token(),
        );

        FaultOutcome {
            tracked,
            decision,
            propagate_to,
            report,
            submission,
        }
    }

    /// Submits a report with the user's own description of what happened
    pub async fn submit_report(
        &self,
        record: ReportRecord,
        user_description: Option<&str>,
    ) -> Result<SubmissionResult, ReportError> {
        self.pipeline.submit_report(record, user_description).await
    }

    /// Tears down every boundary, stops background tasks and flushes logs
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.recovery.teardown_all();
        self.logger.shutdown().await;
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
        tracing::info!("errguard shut down");
    }
}
