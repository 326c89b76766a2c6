//! Analyze command - Replay a fault log through the monitoring engine
//!
//! The log is JSON Lines, one inbound fault per line:
//! `{"error": {"message": "...", "stack": "..."}, "componentName": "...", "timestamp": "..."}`.
//! Faults are tracked in file order and alerts are evaluated as they would
//! have been live, but only logged to the console.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Args;
use errguard_core::domain::{FaultEvent, FaultIntake};
use errguard_monitor::{MetricsRegistry, MonitoringService};

use super::Context;

#[derive(Debug, Args)]
pub struct AnalyzeCommand {
    /// JSON Lines file of inbound faults
    file: PathBuf,
    /// Metrics window in minutes (defaults to the configured window)
    #[arg(long)]
    window: Option<u32>,
    /// Print Prometheus text exposition instead of the summary
    #[arg(long)]
    prometheus: bool,
}

impl AnalyzeCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config();

        let (events, skipped) = read_fault_log(&self.file)?;
        for (line, error) in &skipped {
            formatter.warn(&format!("Line {}: {}", line, error));
        }

        let mut monitoring = config.monitoring.clone();
        monitoring.alert_channels = vec!["console".to_string()];
        let metrics = Arc::new(MetricsRegistry::new()?);
        let service = MonitoringService::new(&monitoring).with_metrics(metrics.clone());

        for event in &events {
            service.track_error_at(event, event.timestamp()).await;
        }

        if self.prometheus {
            print!("{}", metrics.encode()?);
            return Ok(());
        }

        let now = events
            .iter()
            .map(FaultEvent::timestamp)
            .max()
            .unwrap_or_else(Utc::now);
        let window = self.window.unwrap_or(monitoring.time_window_minutes);
        let rate = service.get_error_rate_metrics_at(window, now);
        let analysis = service.get_error_analysis_at(now);
        let alerts = service.dispatcher().history().len();

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "events": events.len(),
                "skipped": skipped.len(),
                "alerts": alerts,
                "metrics": rate,
                "analysis": analysis,
            }));
            return Ok(());
        }

        formatter.success(&format!(
            "Analyzed {} fault(s) from {}",
            events.len(),
            self.file.display()
        ));
        formatter.info(&format!(
            "Last {} minutes: {} error(s), {} critical, {:.1}/hour",
            rate.time_window_minutes, rate.total_errors, rate.critical_errors, rate.error_rate
        ));
        formatter.info(&format!("Alerts fired: {}", alerts));
        formatter.info(&format!("Resolution rate: {:.1}%", analysis.resolution_rate));

        if !analysis.top_errors.is_empty() {
            formatter.info("");
            formatter.info("Top errors:");
            for top in &analysis.top_errors {
                formatter.info(&format!(
                    "  {:>4}x  [{}/{}] {}",
                    top.count, top.category, top.severity, top.message
                ));
            }
        }
        if !analysis.component_health.is_empty() {
            formatter.info("");
            formatter.info("Components:");
            for (name, health) in &analysis.component_health {
                formatter.info(&format!(
                    "  {:<24} {:>4} error(s), health {:.0}%",
                    name, health.total, health.health_score
                ));
            }
        }
        Ok(())
    }
}

/// Parses a fault log, returning the events and the lines that failed
fn read_fault_log(path: &Path) -> Result<(Vec<FaultEvent>, Vec<(usize, String)>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut events = Vec::new();
    let mut skipped = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<FaultIntake>(line) {
            Ok(intake) => events.push(FaultEvent::from(intake)),
            Err(e) => skipped.push((index + 1, e.to_string())),
        }
    }
    Ok((events, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_fault_log_skips_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"error": {{"message": "Failed to fetch"}}, "componentName": "Feed"}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(
            file,
            r#"{{"error": {{"message": "boom"}}, "timestamp": "2026-01-02T03:04:05Z"}}"#
        )
        .unwrap();

        let (events, skipped) = read_fault_log(file.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].component_name(), Some("Feed"));
        assert_eq!(events[1].timestamp().to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].0, 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_fault_log(Path::new("/nonexistent/faults.jsonl")).is_err());
    }
}
