//! Sliding-window metrics and error analysis
//!
//! Pure functions over the tracked-error buffer, evaluated at an explicit
//! instant so results are reproducible.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use errguard_core::domain::{ErrorId, FaultCategory, Severity};

/// Number of entries in [`ErrorAnalysis::top_errors`]
pub const TOP_ERRORS: usize = 5;

/// Hours covered by [`ErrorAnalysis::error_trends`]
pub const TREND_HOURS: i64 = 24;

/// Component name used for faults without one
pub const UNKNOWN_COMPONENT: &str = "unknown";

/// A classified fault held in the monitoring buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedError {
    pub id: ErrorId,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub category: FaultCategory,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub resolved: bool,
}

impl TrackedError {
    fn component_name(&self) -> &str {
        self.component.as_deref().unwrap_or(UNKNOWN_COMPONENT)
    }
}

/// Error counts over the last `time_window_minutes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsWindow {
    pub time_window_minutes: u32,
    pub total_errors: usize,
    pub critical_errors: usize,
    /// Errors per hour: `total * 60 / time_window_minutes`
    pub error_rate: f64,
    pub component_errors: BTreeMap<String, usize>,
    pub category_breakdown: BTreeMap<String, usize>,
    pub errors_by_severity: BTreeMap<String, usize>,
}

/// Counts the errors tracked in `(now - window, now]`
pub fn compute_metrics<'a, I>(errors: I, window_minutes: u32, now: DateTime<Utc>) -> MetricsWindow
where
    I: IntoIterator<Item = &'a TrackedError>,
{
    let window_minutes = window_minutes.max(1);
    let since = now - Duration::minutes(i64::from(window_minutes));

    let mut metrics = MetricsWindow {
        time_window_minutes: window_minutes,
        total_errors: 0,
        critical_errors: 0,
        error_rate: 0.0,
        component_errors: BTreeMap::new(),
        category_breakdown: BTreeMap::new(),
        errors_by_severity: BTreeMap::new(),
    };

    for error in errors
        .into_iter()
        .filter(|e| e.timestamp > since && e.timestamp <= now)
    {
        metrics.total_errors += 1;
        if error.severity == Severity::Critical {
            metrics.critical_errors += 1;
        }
        *metrics
            .component_errors
            .entry(error.component_name().to_string())
            .or_default() += 1;
        *metrics
            .category_breakdown
            .entry(error.category.to_string())
            .or_default() += 1;
        *metrics
            .errors_by_severity
            .entry(error.severity.to_string())
            .or_default() += 1;
    }

    metrics.error_rate = metrics.total_errors as f64 * 60.0 / f64::from(window_minutes);
    metrics
}

// ============================================================================
// Analysis
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopError {
    pub message: String,
    pub count: usize,
    pub category: FaultCategory,
    pub severity: Severity,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendBucket {
    /// Start of the hour
    pub hour: DateTime<Utc>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub total: usize,
    pub resolved: usize,
    /// Percentage of the component's faults marked resolved
    pub health_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnalysis {
    pub top_errors: Vec<TopError>,
    pub error_trends: Vec<TrendBucket>,
    pub component_health: BTreeMap<String, ComponentHealth>,
    /// Percentage of all buffered faults marked resolved
    pub resolution_rate: f64,
}

/// Summarizes the whole buffer
pub fn analyze<'a, I>(errors: I, now: DateTime<Utc>) -> ErrorAnalysis
where
    I: IntoIterator<Item = &'a TrackedError>,
{
    let errors: Vec<&TrackedError> = errors.into_iter().collect();

    let mut by_message: HashMap<&str, TopError> = HashMap::new();
    let mut component_health: BTreeMap<String, ComponentHealth> = BTreeMap::new();
    let mut resolved_total = 0;

    for error in &errors {
        by_message
            .entry(error.message.as_str())
            .and_modify(|top| {
                top.count += 1;
                if error.timestamp >= top.last_seen {
                    top.last_seen = error.timestamp;
                    top.category = error.category;
                    top.severity = error.severity;
                }
            })
            .or_insert_with(|| TopError {
                message: error.message.clone(),
                count: 1,
                category: error.category,
                severity: error.severity,
                last_seen: error.timestamp,
            });

        let health = component_health
            .entry(error.component_name().to_string())
            .or_insert(ComponentHealth {
                total: 0,
                resolved: 0,
                health_score: 0.0,
            });
        health.total += 1;
        if error.resolved {
            health.resolved += 1;
            resolved_total += 1;
        }
    }

    for health in component_health.values_mut() {
        health.health_score = percentage(health.resolved, health.total);
    }

    let mut top_errors: Vec<TopError> = by_message.into_values().collect();
    top_errors.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(b.last_seen.cmp(&a.last_seen))
            .then(a.message.cmp(&b.message))
    });
    top_errors.truncate(TOP_ERRORS);

    ErrorAnalysis {
        top_errors,
        error_trends: hourly_trends(&errors, now),
        component_health,
        resolution_rate: percentage(resolved_total, errors.len()),
    }
}

/// Per-hour counts for the last [`TREND_HOURS`] hours, oldest first
fn hourly_trends(errors: &[&TrackedError], now: DateTime<Utc>) -> Vec<TrendBucket> {
    let current_hour = now
        .duration_trunc(Duration::hours(1))
        .unwrap_or(now);
    let first_hour = current_hour - Duration::hours(TREND_HOURS - 1);

    let mut buckets: Vec<TrendBucket> = (0..TREND_HOURS)
        .map(|offset| TrendBucket {
            hour: first_hour + Duration::hours(offset),
            count: 0,
        })
        .collect();

    for error in errors {
        if error.timestamp < first_hour || error.timestamp > now {
            continue;
        }
        let index = (error.timestamp - first_hour).num_hours() as usize;
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.count += 1;
        }
    }
    buckets
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}
