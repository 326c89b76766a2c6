//! errguard Monitor - Error-rate monitoring and alerting
//!
//! This crate provides:
//! - **MonitoringService** - bounded ring buffer of classified faults with
//!   edge-triggered threshold alerts
//! - **Window metrics** - sliding-window counts, hourly trends, top errors and
//!   per-component health
//! - **AlertDispatcher** - console, webhook and email alert delivery with a
//!   capped dispatch history
//! - **PerformanceMonitor** - optional timing side channel
//! - **MetricsRegistry** - Prometheus counters and histograms

pub mod alerts;
pub mod metrics;
pub mod performance;
pub mod service;
pub mod window;

pub use alerts::{Alert, AlertDispatcher, AlertReason, DispatchRecord, MAX_ALERT_HISTORY};
pub use metrics::MetricsRegistry;
pub use performance::{PerformanceEntry, PerformanceMonitor, PerformanceSummary};
pub use service::{MonitoringService, MonitoringStatus};
pub use window::{
    analyze, compute_metrics, ComponentHealth, ErrorAnalysis, MetricsWindow, TopError,
    TrackedError, TrendBucket,
};
