//! Logger - leveled logging with console, local and remote sinks
//!
//! Every entry at or above the configured minimum level is:
//! - mirrored to `tracing` (console sink)
//! - appended to a capped FIFO in the persistent store (local sink)
//! - buffered for batched delivery to the remote endpoint (remote sink)
//!
//! All sinks are non-fatal: failures are logged via `tracing::warn!` and
//! never propagated, so logging can never interrupt fault handling.
//! A remote batch that cannot be delivered is put back in front of the
//! buffer and retried on the next flush.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use errguard_core::config::LoggingConfig;
use errguard_core::ports::{keys, read_json, write_json, IStateStore, ITransport};
use errguard_privacy::Sanitizer;

use crate::entry::{LogEntry, LogLevel};

/// Remote buffer cap, in batches, kept while the endpoint is unreachable
const MAX_BUFFERED_BATCHES: usize = 10;

/// Result of a remote flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered or remote logging is disabled
    Empty,
    /// This many entries were delivered
    Delivered(usize),
    /// Delivery failed; this many entries were re-queued
    Requeued(usize),
}

/// Structured, leveled logger with console, local and remote sinks
pub struct Logger {
    config: LoggingConfig,
    min_level: LogLevel,
    store: Option<Arc<dyn IStateStore>>,
    transport: Option<Arc<dyn ITransport>>,
    sanitizer: Option<Arc<Sanitizer>>,
    buffer: Mutex<VecDeque<LogEntry>>,
    local_lock: Mutex<()>,
    shutdown: CancellationToken,
    flush_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Logger {
    /// Creates a logger; sinks without a backing store/transport are skipped
    pub fn new(
        config: LoggingConfig,
        store: Option<Arc<dyn IStateStore>>,
        transport: Option<Arc<dyn ITransport>>,
    ) -> Self {
        let min_level = config.min_level.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid logging.min_level, using info");
            LogLevel::Info
        });
        Self {
            config,
            min_level,
            store,
            transport,
            sanitizer: None,
            buffer: Mutex::new(VecDeque::new()),
            local_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
            flush_task: std::sync::Mutex::new(None),
        }
    }

    /// Sanitize messages and context before they reach any sink
    pub fn with_sanitizer(mut self, sanitizer: Arc<Sanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    fn remote_enabled(&self) -> bool {
        self.config.enable_remote_logging
            && self.transport.is_some()
            && self.config.remote_endpoint.is_some()
    }

    // ========================================================================
    // Logging
    // ========================================================================

    /// Records an entry at `level` with optional structured context
    pub async fn log(&self, level: LogLevel, message: &str, context: Option<Map<String, Value>>) {
        if level < self.min_level {
            return;
        }

        let (message, context) = match &self.sanitizer {
            Some(s) => (
                s.sanitize_string(message),
                context.map(|c| s.sanitize_map(&c)).unwrap_or_default(),
            ),
            None => (message.to_string(), context.unwrap_or_default()),
        };
        let entry = LogEntry::new(level, message).with_context(context);

        if self.config.enable_console_logging {
            emit_console(&entry);
        }

        if self.config.enable_local_storage {
            self.store_locally(&entry).await;
        }

        if self.remote_enabled() {
            let should_flush = {
                let mut buffer = self.buffer.lock().await;
                buffer.push_back(entry);
                buffer.len() >= self.config.batch_size
            };
            if should_flush {
                self.flush().await;
            }
        }
    }

    pub async fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None).await;
    }

    pub async fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None).await;
    }

    pub async fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None).await;
    }

    pub async fn error(&self, message: &str, context: Option<Map<String, Value>>) {
        self.log(LogLevel::Error, message, context).await;
    }

    pub async fn critical(&self, message: &str, context: Option<Map<String, Value>>) {
        self.log(LogLevel::Critical, message, context).await;
    }

    // ========================================================================
    // Local sink
    // ========================================================================

    async fn store_locally(&self, entry: &LogEntry) {
        let Some(store) = &self.store else {
            return;
        };
        let _guard = self.local_lock.lock().await;
        let mut entries: VecDeque<LogEntry> = read_json(store.as_ref(), keys::LOGS).await;
        entries.push_back(entry.clone());
        while entries.len() > self.config.max_local_storage_entries {
            entries.pop_front();
        }
        write_json(store.as_ref(), keys::LOGS, &entries).await;
    }

    /// Entries kept in the local sink, oldest first
    pub async fn stored_entries(&self) -> Vec<LogEntry> {
        match &self.store {
            Some(store) => read_json(store.as_ref(), keys::LOGS).await,
            None => Vec::new(),
        }
    }

    /// Removes every locally stored entry
    pub async fn clear_stored_entries(&self) {
        if let Some(store) = &self.store {
            let _guard = self.local_lock.lock().await;
            write_json(store.as_ref(), keys::LOGS, &Vec::<LogEntry>::new()).await;
        }
    }

    /// Number of entries waiting for remote delivery
    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    // ========================================================================
    // Remote sink
    // ========================================================================

    /// Sends buffered entries to the remote endpoint
    ///
    /// Each batch is attempted up to `max_retries` times with a linearly
    /// growing delay. On failure the batch is re-queued ahead of newer
    /// entries.
    pub async fn flush(&self) -> FlushOutcome {
        let (Some(transport), Some(endpoint)) = (&self.transport, &self.config.remote_endpoint)
        else {
            return FlushOutcome::Empty;
        };
        if !self.config.enable_remote_logging {
            return FlushOutcome::Empty;
        }

        let batch: Vec<LogEntry> = {
            let mut buffer = self.buffer.lock().await;
            buffer.drain(..).collect()
        };
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let body = json!({
            "logs": batch,
            "sentAt": chrono::Utc::now(),
        });

        let attempts = self.config.max_retries.max(1);
        for attempt in 1..=attempts {
            match transport.post_json(endpoint, &body).await {
                Ok(response) if response.is_success() => {
                    tracing::debug!(count = batch.len(), "Flushed log batch");
                    return FlushOutcome::Delivered(batch.len());
                }
                Ok(response) => {
                    tracing::warn!(status = response.status, attempt, "Log endpoint rejected batch");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Failed to send log batch");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay() * attempt).await;
            }
        }

        let count = batch.len();
        self.requeue(batch).await;
        FlushOutcome::Requeued(count)
    }

    async fn requeue(&self, batch: Vec<LogEntry>) {
        let mut buffer = self.buffer.lock().await;
        for entry in batch.into_iter().rev() {
            buffer.push_front(entry);
        }
        let cap = self.config.batch_size.max(1) * MAX_BUFFERED_BATCHES;
        let mut dropped = 0usize;
        while buffer.len() > cap {
            buffer.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "Remote log buffer full, dropped oldest entries");
        }
    }

    // ========================================================================
    // Periodic flush lifecycle
    // ========================================================================

    /// Starts the periodic flush task
    ///
    /// The task holds only a weak reference, so dropping the last `Arc`
    /// of the logger ends it. Calling `start` twice has no effect.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.flush_task.lock().unwrap();
        if slot.is_some() || !self.remote_enabled() {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let token = self.shutdown.clone();
        let period: Duration = self.config.flush_interval();

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(logger) = weak.upgrade() else { break };
                        logger.flush().await;
                    }
                }
            }
            tracing::debug!("Log flush task stopped");
        }));
        tracing::debug!(interval_ms = period.as_millis() as u64, "Log flush task started");
    }

    /// Stops the periodic flush task and performs a final flush
    pub async fn shutdown(&self) -> FlushOutcome {
        self.shutdown.cancel();
        let handle = self.flush_task.lock().unwrap().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Log flush task ended abnormally");
            }
        }
        self.flush().await
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn emit_console(entry: &LogEntry) {
    let context = if entry.context.is_empty() {
        String::new()
    } else {
        Value::Object(entry.context.clone()).to_string()
    };
    match entry.level {
        LogLevel::Debug => tracing::debug!(context = %context, "{}", entry.message),
        LogLevel::Info => tracing::info!(context = %context, "{}", entry.message),
        LogLevel::Warn => tracing::warn!(context = %context, "{}", entry.message),
        LogLevel::Error => tracing::error!(context = %context, "{}", entry.message),
        LogLevel::Critical => {
            tracing::error!(critical = true, context = %context, "{}", entry.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use errguard_core::ports::{MemoryStateStore, TransportResponse};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records every POST; fails while `failing` is set
    #[derive(Default)]
    struct RecordingTransport {
        bodies: std::sync::Mutex<Vec<Value>>,
        failing: AtomicBool,
    }

    impl RecordingTransport {
        fn calls(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ITransport for RecordingTransport {
        async fn post_json(&self, _endpoint: &str, body: &Value) -> anyhow::Result<TransportResponse> {
            self.bodies.lock().unwrap().push(body.clone());
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            Ok(TransportResponse::new(200, None))
        }
    }

    fn remote_config(batch_size: usize) -> LoggingConfig {
        LoggingConfig {
            enable_console_logging: false,
            enable_remote_logging: true,
            remote_endpoint: Some("http://logs.local/ingest".into()),
            batch_size,
            flush_interval_ms: 5_000,
            max_retries: 2,
            retry_delay_ms: 10,
            ..LoggingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_min_level_filters_entries() {
        let store = Arc::new(MemoryStateStore::new());
        let config = LoggingConfig {
            min_level: "warn".into(),
            enable_console_logging: false,
            ..LoggingConfig::default()
        };
        let logger = Logger::new(config, Some(store), None);

        logger.info("ignored").await;
        logger.warn("kept").await;
        logger.critical("kept too", None).await;

        let entries = logger.stored_entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "kept");
        assert_eq!(entries[1].level, LogLevel::Critical);
    }

    #[tokio::test]
    async fn test_local_storage_is_capped_fifo() {
        let store = Arc::new(MemoryStateStore::new());
        let config = LoggingConfig {
            enable_console_logging: false,
            max_local_storage_entries: 3,
            ..LoggingConfig::default()
        };
        let logger = Logger::new(config, Some(store), None);
        for i in 0..5 {
            logger.info(&format!("entry {i}")).await;
        }
        let messages: Vec<_> = logger
            .stored_entries()
            .await
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[tokio::test]
    async fn test_entries_are_sanitized() {
        let store = Arc::new(MemoryStateStore::new());
        let config = LoggingConfig {
            enable_console_logging: false,
            ..LoggingConfig::default()
        };
        let logger = Logger::new(config, Some(store), None)
            .with_sanitizer(Arc::new(Sanitizer::default()));
        logger.info("user bob@example.com signed in").await;
        assert_eq!(
            logger.stored_entries().await[0].message,
            "user [EMAIL_REDACTED] signed in"
        );
    }

    #[tokio::test]
    async fn test_batch_size_triggers_flush() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Logger::new(remote_config(3), None, Some(transport.clone()));

        logger.info("one").await;
        logger.info("two").await;
        assert_eq!(transport.calls(), 0);
        logger.info("three").await;

        assert_eq!(transport.calls(), 1);
        let body = transport.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["logs"].as_array().unwrap().len(), 3);
        assert_eq!(logger.buffered().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_requeues_in_order() {
        let transport = Arc::new(RecordingTransport::default());
        transport.failing.store(true, Ordering::SeqCst);
        let logger = Logger::new(remote_config(10), None, Some(transport.clone()));

        logger.info("first").await;
        logger.info("second").await;
        assert_eq!(logger.flush().await, FlushOutcome::Requeued(2));
        assert_eq!(transport.calls(), 2);
        assert_eq!(logger.buffered().await, 2);

        transport.failing.store(false, Ordering::SeqCst);
        logger.info("third").await;
        assert_eq!(logger.flush().await, FlushOutcome::Delivered(3));
        let last = transport.bodies.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last["logs"][0]["message"], "first");
        assert_eq!(last["logs"][2]["message"], "third");
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_flush_and_final_flush_on_shutdown() {
        let transport = Arc::new(RecordingTransport::default());
        let logger = Arc::new(Logger::new(remote_config(100), None, Some(transport.clone())));
        logger.start();

        logger.info("tick").await;
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(transport.calls(), 1);

        logger.info("late").await;
        assert_eq!(logger.shutdown().await, FlushOutcome::Delivered(1));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_flush_without_remote_is_empty() {
        let logger = Logger::new(LoggingConfig::default(), None, None);
        logger.info("local only").await;
        assert_eq!(logger.flush().await, FlushOutcome::Empty);
    }
}
