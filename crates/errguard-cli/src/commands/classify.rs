//! Classify command - Show how a fault message is categorized

use anyhow::Result;
use clap::Args;
use errguard_core::domain::{classify, classify_auth_fault};

use super::Context;

#[derive(Debug, Args)]
pub struct ClassifyCommand {
    /// Fault message
    message: String,
    /// Stack trace to include in the match
    #[arg(long)]
    stack: Option<String>,
    /// Use the authentication/token rule set
    #[arg(long)]
    auth: bool,
}

impl ClassifyCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();

        if self.auth {
            let result = classify_auth_fault(&self.message);
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "kind": result.kind,
                    "severity": result.severity,
                    "recoverable": result.recoverable,
                    "hint": result.kind.user_hint(),
                }));
            } else {
                formatter.success(&format!("{} ({})", result.kind, result.severity));
                formatter.info(&format!("Recoverable: {}", result.recoverable));
                formatter.info(result.kind.user_hint());
            }
            return Ok(());
        }

        let result = classify(&self.message, self.stack.as_deref());
        if ctx.format.is_json() {
            formatter.print_json(&serde_json::to_value(result)?);
        } else {
            formatter.success(&format!("Category: {}", result.category));
            formatter.info(&format!("Severity: {}", result.severity));
            formatter.info(&format!(
                "Transient: {}",
                if result.category.is_transient() { "yes" } else { "no" }
            ));
        }
        Ok(())
    }
}
