//! Sanitize command - Preview redaction of text or a URL

use anyhow::Result;
use clap::Args;
use errguard_privacy::{Sanitizer, SanitizerConfig};

use super::Context;

#[derive(Debug, Args)]
pub struct SanitizeCommand {
    /// Text (or URL with --url) to sanitize
    input: String,
    /// Treat the input as a URL
    #[arg(long)]
    url: bool,
}

impl SanitizeCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let config = ctx.load_config();
        let sanitizer = Sanitizer::new(SanitizerConfig::from(&config.privacy));

        let output = if self.url {
            sanitizer.sanitize_url(&self.input)
        } else {
            sanitizer.sanitize_string(&self.input)
        };

        if ctx.format.is_json() {
            ctx.formatter().print_json(&serde_json::json!({
                "input_length": self.input.len(),
                "sanitized": output,
                "changed": output != self.input,
            }));
        } else {
            println!("{output}");
        }
        Ok(())
    }
}
