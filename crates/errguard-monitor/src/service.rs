//! Monitoring service
//!
//! Every tracked fault is classified and appended to a bounded ring
//! buffer. After each append the configured window is evaluated against
//! the alert thresholds. Alerts are edge-triggered: one dispatch when a
//! threshold is first crossed, re-armed once the window is back under
//! every threshold.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use errguard_core::config::MonitoringConfig;
use errguard_core::domain::{classify, AlertChannel, ErrorId, FaultEvent};
use errguard_core::ports::ITransport;

use crate::alerts::{evaluate, Alert, AlertDispatcher, DispatchRecord};
use crate::metrics::MetricsRegistry;
use crate::performance::PerformanceMonitor;
use crate::window::{analyze, compute_metrics, ErrorAnalysis, MetricsWindow, TrackedError};

/// Snapshot returned by [`MonitoringService::get_monitoring_status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringStatus {
    pub buffered_errors: usize,
    pub buffer_capacity: usize,
    pub current_window: MetricsWindow,
    pub alert_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_alert_at: Option<DateTime<Utc>>,
    pub alert_channels: Vec<AlertChannel>,
    pub recent_dispatches: Vec<DispatchRecord>,
    pub performance_enabled: bool,
}

#[derive(Default)]
struct Buffer {
    errors: VecDeque<TrackedError>,
    alert_active: bool,
    last_alert_at: Option<DateTime<Utc>>,
}

pub struct MonitoringService {
    buffer: Mutex<Buffer>,
    capacity: usize,
    dispatcher: AlertDispatcher,
    metrics: Option<Arc<MetricsRegistry>>,
    performance: Option<PerformanceMonitor>,
}

impl MonitoringService {
    pub fn new(config: &MonitoringConfig) -> Self {
        let mut dispatcher = AlertDispatcher::new(config.alert_config());
        if let Some(endpoint) = &config.email_endpoint {
            dispatcher = dispatcher.with_email_endpoint(endpoint.clone());
        }
        Self {
            buffer: Mutex::new(Buffer::default()),
            capacity: config.buffer_size.max(1),
            dispatcher,
            metrics: None,
            performance: config.enable_performance.then(PerformanceMonitor::new),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn ITransport>) -> Self {
        self.dispatcher = self.dispatcher.with_transport(transport);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.dispatcher = self.dispatcher.with_metrics(metrics.clone());
        self.performance = self
            .performance
            .map(|perf| perf.with_metrics(metrics.clone()));
        self.metrics = Some(metrics);
        self
    }

    /// Performance side channel, when enabled
    pub fn performance(&self) -> Option<&PerformanceMonitor> {
        self.performance.as_ref()
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub async fn track_error(&self, event: &FaultEvent) -> TrackedError {
        self.track_error_at(event, Utc::now()).await
    }

    /// Tracks `event` and evaluates the alert window ending at `now`
    pub async fn track_error_at(&self, event: &FaultEvent, now: DateTime<Utc>) -> TrackedError {
        let classification = classify(event.message(), event.stack_trace());
        let tracked = TrackedError {
            id: event.id(),
            timestamp: event.timestamp(),
            message: event.message().to_string(),
            category: classification.category,
            severity: classification.severity,
            component: event.component_name().map(str::to_string),
            resolved: false,
        };

        let config = self.dispatcher.config();
        let (alert, buffered) = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.errors.push_back(tracked.clone());
            while buffer.errors.len() > self.capacity {
                buffer.errors.pop_front();
            }

            let window = compute_metrics(&buffer.errors, config.time_window_minutes, now);
            let reasons = evaluate(&window, config);
            let alert = if reasons.is_empty() {
                buffer.alert_active = false;
                None
            } else if buffer.alert_active {
                None
            } else {
                buffer.alert_active = true;
                buffer.last_alert_at = Some(now);
                Some(Alert::new(reasons, window, now))
            };
            (alert, buffer.errors.len())
        };

        tracing::debug!(
            error_id = %tracked.id,
            classification = %classification,
            "Tracked error"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_error(tracked.category.as_str(), tracked.severity.as_str());
            metrics.set_buffered(buffered);
        }

        if let Some(alert) = alert {
            tracing::info!(alert_id = %alert.id, "Alert threshold crossed");
            self.dispatcher.dispatch(&alert).await;
        }
        tracked
    }

    pub fn get_error_rate_metrics(&self, window_minutes: u32) -> MetricsWindow {
        self.get_error_rate_metrics_at(window_minutes, Utc::now())
    }

    pub fn get_error_rate_metrics_at(&self, window_minutes: u32, now: DateTime<Utc>) -> MetricsWindow {
        let buffer = self.buffer.lock().unwrap();
        compute_metrics(&buffer.errors, window_minutes, now)
    }

    pub fn get_error_analysis(&self) -> ErrorAnalysis {
        self.get_error_analysis_at(Utc::now())
    }

    pub fn get_error_analysis_at(&self, now: DateTime<Utc>) -> ErrorAnalysis {
        let buffer = self.buffer.lock().unwrap();
        analyze(&buffer.errors, now)
    }

    /// Marks every buffered occurrence of `id` resolved.
    ///
    /// Returns false when the id is not buffered.
    pub fn mark_error_resolved(&self, id: ErrorId) -> bool {
        let mut newly_resolved = 0;
        let mut found = false;
        {
            let mut buffer = self.buffer.lock().unwrap();
            for error in buffer.errors.iter_mut().filter(|e| e.id == id) {
                found = true;
                if !error.resolved {
                    error.resolved = true;
                    newly_resolved += 1;
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            for _ in 0..newly_resolved {
                metrics.record_resolved();
            }
        }
        found
    }

    pub fn get_monitoring_status(&self) -> MonitoringStatus {
        let config = self.dispatcher.config();
        let buffer = self.buffer.lock().unwrap();
        MonitoringStatus {
            buffered_errors: buffer.errors.len(),
            buffer_capacity: self.capacity,
            current_window: compute_metrics(&buffer.errors, config.time_window_minutes, Utc::now()),
            alert_active: buffer.alert_active,
            last_alert_at: buffer.last_alert_at,
            alert_channels: config.alert_channels.clone(),
            recent_dispatches: self.dispatcher.history(),
            performance_enabled: self.performance.is_some(),
        }
    }

    /// Buffered errors, oldest first
    pub fn errors(&self) -> Vec<TrackedError> {
        self.buffer.lock().unwrap().errors.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use errguard_core::domain::{FaultCategory, Severity};
    use errguard_core::ports::TransportResponse;
    use serde_json::Value;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<Value>>,
    }

    #[async_trait::async_trait]
    impl ITransport for RecordingTransport {
        async fn post_json(&self, _endpoint: &str, body: &Value) -> anyhow::Result<TransportResponse> {
            self.calls.lock().unwrap().push(body.clone());
            Ok(TransportResponse::new(200, None))
        }
    }

    fn webhook_config(threshold: f64, window: u32) -> MonitoringConfig {
        MonitoringConfig {
            error_rate_threshold: threshold,
            time_window_minutes: window,
            alert_channels: vec!["webhook".into()],
            webhook_url: Some("https://hooks.example.com/errors".into()),
            ..MonitoringConfig::default()
        }
    }

    fn fault_at(message: &str, at: DateTime<Utc>) -> FaultEvent {
        FaultEvent::new(message)
            .with_component("Checkout")
            .with_timestamp(at)
    }

    #[tokio::test]
    async fn test_breach_dispatches_exactly_once() {
        let transport = Arc::new(RecordingTransport::default());
        let service = MonitoringService::new(&webhook_config(5.0, 30)).with_transport(transport.clone());
        let now = Utc::now();

        for i in 0..6 {
            let at = now - Duration::minutes(10) + Duration::minutes(i);
            service.track_error_at(&fault_at("Render failed", at), at).await;
        }

        assert_eq!(transport.calls.lock().unwrap().len(), 1);
        let status = service.get_monitoring_status();
        assert!(status.alert_active);
        assert_eq!(status.recent_dispatches.len(), 1);
        assert!(status.recent_dispatches[0].success);
    }

    #[tokio::test]
    async fn test_alert_rearms_after_window_clears() {
        let transport = Arc::new(RecordingTransport::default());
        let service = MonitoringService::new(&webhook_config(5.0, 30)).with_transport(transport.clone());
        let start = Utc::now() - Duration::hours(3);

        for i in 0..4 {
            let at = start + Duration::minutes(i);
            service.track_error_at(&fault_at("burst one", at), at).await;
        }
        // a lone fault two hours later sits below every threshold
        let quiet = start + Duration::hours(2);
        service.track_error_at(&fault_at("quiet", quiet), quiet).await;
        assert!(!service.get_monitoring_status().alert_active);

        for i in 0..4 {
            let at = quiet + Duration::minutes(1 + i);
            service.track_error_at(&fault_at("burst two", at), at).await;
        }
        assert_eq!(transport.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_critical_threshold_alerts() {
        let transport = Arc::new(RecordingTransport::default());
        let config = MonitoringConfig {
            error_rate_threshold: 1000.0,
            critical_error_threshold: 1,
            ..webhook_config(1000.0, 60)
        };
        let service = MonitoringService::new(&config).with_transport(transport.clone());
        let now = Utc::now();

        // out of memory classifies as system/critical
        service.track_error_at(&fault_at("out of memory", now), now).await;
        assert!(transport.calls.lock().unwrap().is_empty());
        service.track_error_at(&fault_at("out of memory", now), now).await;
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ring_buffer_drops_oldest() {
        let config = MonitoringConfig {
            buffer_size: 3,
            alert_channels: Vec::new(),
            ..MonitoringConfig::default()
        };
        let service = MonitoringService::new(&config);
        let now = Utc::now();
        for i in 0..5 {
            service.track_error_at(&fault_at(&format!("e{i}"), now), now).await;
        }

        let messages: Vec<String> = service.errors().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["e2", "e3", "e4"]);
    }

    #[tokio::test]
    async fn test_track_classifies_and_reports_metrics() {
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let config = MonitoringConfig {
            alert_channels: Vec::new(),
            ..MonitoringConfig::default()
        };
        let service = MonitoringService::new(&config).with_metrics(metrics.clone());

        let tracked = service
            .track_error(&FaultEvent::new("Failed to fetch data from server"))
            .await;
        assert_eq!(tracked.category, FaultCategory::Network);
        assert_eq!(tracked.severity, Severity::High);

        let window = service.get_error_rate_metrics(60);
        assert_eq!(window.total_errors, 1);
        assert_eq!(window.category_breakdown["network"], 1);
        assert!(metrics
            .encode()
            .unwrap()
            .contains(r#"errguard_errors_total{category="network",severity="high"} 1"#));
    }

    #[tokio::test]
    async fn test_mark_resolved_feeds_analysis() {
        let config = MonitoringConfig {
            alert_channels: Vec::new(),
            ..MonitoringConfig::default()
        };
        let service = MonitoringService::new(&config);
        let first = service.track_error(&FaultEvent::new("a")).await;
        service.track_error(&FaultEvent::new("b")).await;

        assert!(service.mark_error_resolved(first.id));
        assert!(!service.mark_error_resolved(ErrorId::new()));

        let analysis = service.get_error_analysis();
        assert_eq!(analysis.resolution_rate, 50.0);
        assert_eq!(analysis.component_health["unknown"].health_score, 50.0);
    }

    #[tokio::test]
    async fn test_performance_channel_is_optional() {
        let config = MonitoringConfig {
            enable_performance: false,
            alert_channels: Vec::new(),
            ..MonitoringConfig::default()
        };
        let service = MonitoringService::new(&config);
        assert!(service.performance().is_none());
        service.track_error(&FaultEvent::new("still tracked")).await;
        assert_eq!(service.errors().len(), 1);
        assert!(!service.get_monitoring_status().performance_enabled);
    }
}
