//! Consent command - View and change what may be collected and reported

use anyhow::{Context as _, Result};
use clap::Subcommand;
use errguard_core::domain::{ConsentLevel, DataType};

use super::Context;

#[derive(Debug, Subcommand)]
pub enum ConsentCommand {
    /// Show the current consent and what it allows
    Status,
    /// Grant consent at a level: none, basic, detailed or full
    Set {
        level: String,
    },
    /// Revoke consent and purge stored report data
    Revoke,
}

impl ConsentCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let guard = ctx.open_guard().await?;
        let result = self.run(ctx, &guard).await;
        guard.shutdown().await;
        result
    }

    async fn run(&self, ctx: &Context, guard: &errguard::ErrorGuard) -> Result<()> {
        let formatter = ctx.formatter();
        let consent = guard.consent();

        match self {
            ConsentCommand::Status => {
                let status = consent.get_status().await;
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::to_value(&status)?);
                    return Ok(());
                }

                if !status.has_consent {
                    formatter.info("No consent given; nothing is collected.");
                    return Ok(());
                }
                formatter.success(&format!("Consent level: {}", status.level));
                if status.needs_update {
                    formatter.warn("Consent is expired or outdated and must be renewed");
                }
                if let Some(config) = &status.config {
                    for data_type in DataType::ALL {
                        let mark = if config.allows(data_type) { "yes" } else { "no" };
                        formatter.info(&format!("{:<24} {}", data_type.to_string(), mark));
                    }
                    formatter.info(&format!(
                        "{:<24} {} days",
                        "retention", config.data_retention_days
                    ));
                    formatter.info(&format!(
                        "{:<24} {}",
                        "granted",
                        config.consent_timestamp.to_rfc3339()
                    ));
                }
            }

            ConsentCommand::Set { level } => {
                let level: ConsentLevel = level.parse().context("Invalid consent level")?;
                let config = consent.set_level(level).await?;
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::to_value(&config)?);
                } else {
                    formatter.success(&format!("Consent set to {}", config.level));
                }
            }

            ConsentCommand::Revoke => {
                consent.revoke().await?;
                formatter.success("Consent revoked; stored reports and user actions purged");
            }
        }
        Ok(())
    }
}
