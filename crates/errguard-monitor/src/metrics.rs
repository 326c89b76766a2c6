//! Prometheus metrics registry
//!
//! Counters for tracked faults, dispatched alerts and resolutions, plus a
//! duration histogram fed by the performance side channel.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Registry holding every monitoring metric
pub struct MetricsRegistry {
    registry: Registry,
    /// Counter: tracked faults by (category, severity)
    pub errors_total: IntCounterVec,
    /// Counter: alert dispatches by (channel, status)
    pub alerts_total: IntCounterVec,
    /// Counter: faults marked resolved
    pub errors_resolved_total: IntCounter,
    /// Gauge: faults currently held in the ring buffer
    pub buffered_errors: IntGauge,
    /// Histogram: measured operation duration in seconds
    pub operation_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("errguard".to_string()), None)?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Tracked faults"),
            &["category", "severity"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let alerts_total = IntCounterVec::new(
            Opts::new("alerts_total", "Alert dispatches"),
            &["channel", "status"],
        )?;
        registry.register(Box::new(alerts_total.clone()))?;

        let errors_resolved_total =
            IntCounter::new("errors_resolved_total", "Faults marked resolved")?;
        registry.register(Box::new(errors_resolved_total.clone()))?;

        let buffered_errors = IntGauge::new("buffered_errors", "Faults held in the buffer")?;
        registry.register(Box::new(buffered_errors.clone()))?;

        let operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "operation_duration_seconds",
                "Measured operation duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, f64::INFINITY]),
            &["kind"],
        )?;
        registry.register(Box::new(operation_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            errors_total,
            alerts_total,
            errors_resolved_total,
            buffered_errors,
            operation_duration_seconds,
        })
    }

    pub fn record_error(&self, category: &str, severity: &str) {
        self.errors_total
            .with_label_values(&[category, severity])
            .inc();
    }

    pub fn record_alert(&self, channel: &str, success: bool) {
        let status = if success { "sent" } else { "failed" };
        self.alerts_total
            .with_label_values(&[channel, status])
            .inc();
    }

    pub fn record_resolved(&self) {
        self.errors_resolved_total.inc();
    }

    pub fn set_buffered(&self, count: usize) {
        self.buffered_errors.set(count as i64);
    }

    pub fn observe_duration(&self, kind: &str, duration_secs: f64) {
        self.operation_duration_seconds
            .with_label_values(&[kind])
            .observe(duration_secs);
    }

    /// Encodes every metric in the Prometheus text exposition format
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
