//! Performance instrumentation side channel
//!
//! Optional timing samples kept apart from error tracking. The monitor
//! works the same whether or not anything is recorded here.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics::MetricsRegistry;

/// Samples retained; oldest dropped first
pub const MAX_PERFORMANCE_ENTRIES: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    pub name: String,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate over all samples sharing a name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub count: usize,
    pub avg_ms: f64,
    pub max_ms: f64,
}

pub struct PerformanceMonitor {
    entries: Mutex<VecDeque<PerformanceEntry>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn record(&self, name: impl Into<String>, duration: Duration) {
        let name = name.into();
        if let Some(metrics) = &self.metrics {
            metrics.observe_duration(&name, duration.as_secs_f64());
        }

        let mut entries = self.entries.lock().unwrap();
        entries.push_back(PerformanceEntry {
            name,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        });
        while entries.len() > MAX_PERFORMANCE_ENTRIES {
            entries.pop_front();
        }
    }

    /// Runs `fut` and records how long it took under `name`
    pub async fn time<F, T>(&self, name: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        self.record(name, started.elapsed());
        output
    }

    pub fn entries(&self) -> Vec<PerformanceEntry> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> BTreeMap<String, PerformanceSummary> {
        let entries = self.entries.lock().unwrap();
        let mut summary: BTreeMap<String, PerformanceSummary> = BTreeMap::new();
        for entry in entries.iter() {
            let item = summary
                .entry(entry.name.clone())
                .or_insert(PerformanceSummary {
                    count: 0,
                    avg_ms: 0.0,
                    max_ms: 0.0,
                });
            // running mean
            item.count += 1;
            item.avg_ms += (entry.duration_ms - item.avg_ms) / item.count as f64;
            item.max_ms = item.max_ms.max(entry.duration_ms);
        }
        summary
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
