//! Reports command - Manage locally stored error reports
//!
//! Provides the `errguard reports` CLI command with subcommands:
//! - `list`: Show stored reports (pending, delivered and failed)
//! - `view <id>`: Display one report
//! - `retry`: Re-attempt delivery of every failed report
//! - `clear`: Remove all stored reports

use anyhow::{Context as _, Result};
use clap::Subcommand;
use errguard::ErrorGuard;
use errguard_core::domain::{ErrorId, StoredReport};

use super::Context;

#[derive(Debug, Subcommand)]
pub enum ReportsCommand {
    /// List stored reports
    List {
        /// Only show reports whose delivery failed
        #[arg(long)]
        failed: bool,
    },
    /// View a specific report
    View {
        /// Error id of the report
        id: String,
    },
    /// Retry delivery of failed reports
    Retry,
    /// Delete every stored report
    Clear,
}

impl ReportsCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let guard = ctx.open_guard().await?;
        let result = self.run(ctx, &guard).await;
        guard.shutdown().await;
        result
    }

    async fn run(&self, ctx: &Context, guard: &ErrorGuard) -> Result<()> {
        let formatter = ctx.formatter();
        let queue = guard.pipeline().queue();

        match self {
            ReportsCommand::List { failed } => {
                let reports = if *failed {
                    queue.failed().await
                } else {
                    queue.pending().await
                };

                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::to_value(&reports)?);
                    return Ok(());
                }
                if reports.is_empty() {
                    formatter.info("No reports found.");
                    return Ok(());
                }

                println!(
                    "{:<38} {:<8} {:<9} {:<20} {}",
                    "ID", "Status", "Severity", "Stored", "Message"
                );
                println!("{}", "-".repeat(100));
                for report in &reports {
                    println!(
                        "{:<38} {:<8} {:<9} {:<20} {}",
                        report.error_id().to_string(),
                        report.status.to_string(),
                        report.record.severity.to_string(),
                        report.stored_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        truncate(&report.record.message, 40),
                    );
                }
                println!();
                println!("Total: {} report(s)", reports.len());
            }

            ReportsCommand::View { id } => {
                let error_id: ErrorId = id.parse().context("Invalid report id")?;
                match queue.find(error_id).await {
                    Some(report) if ctx.format.is_json() => {
                        formatter.print_json(&serde_json::to_value(&report)?);
                    }
                    Some(report) => print_report(&report),
                    None => formatter.error(&format!("Report '{}' not found", id)),
                }
            }

            ReportsCommand::Retry => {
                let summary = guard.pipeline().retry_failed().await;
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "attempted": summary.attempted,
                        "delivered": summary.delivered,
                        "failed": summary.failed,
                    }));
                } else if summary.attempted == 0 {
                    formatter.info("No failed reports to retry.");
                } else {
                    formatter.success(&format!(
                        "Delivered {} of {} failed report(s)",
                        summary.delivered, summary.attempted
                    ));
                    if summary.failed > 0 {
                        formatter.warn(&format!("{} report(s) still failing", summary.failed));
                    }
                }
            }

            ReportsCommand::Clear => {
                if queue.clear().await {
                    formatter.success("All stored reports deleted");
                } else {
                    formatter.error("Failed to delete stored reports");
                }
            }
        }
        Ok(())
    }
}

fn print_report(report: &StoredReport) {
    let record = &report.record;
    println!("Error ID:    {}", record.error_id);
    println!("Status:      {}", report.status);
    println!("Category:    {} / {}", record.category, record.severity);
    println!("Timestamp:   {}", record.timestamp.to_rfc3339());
    println!("Session:     {}", record.session_id);
    println!("URL:         {}", record.url);
    println!("Message:     {}", record.message);
    if let Some(description) = &record.user_description {
        println!("Description: {}", description);
    }
    if let Some(remote_id) = &report.remote_id {
        println!("Remote ID:   {}", remote_id);
    }
    if let Some(error) = &report.last_error {
        println!("Last error:  {} (after {} attempt(s))", error, report.attempts);
    }
    if let Some(stack) = &record.stack {
        println!();
        println!("{}", stack);
    }
    if !record.additional_context.is_empty() {
        println!();
        println!(
            "{}",
            serde_json::to_string_pretty(&record.additional_context).unwrap_or_default()
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() <= max_chars {
        return first_line.to_string();
    }
    let mut short: String = first_line.chars().take(max_chars.saturating_sub(3)).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_first_line() {
        assert_eq!(truncate("short\nsecond line", 40), "short");
        assert_eq!(truncate("abcdefghij", 6), "abc...");
    }
}
