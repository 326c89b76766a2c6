//! errguard CLI - Command-line interface for errguard
//!
//! Provides commands for:
//! - Classifying fault messages
//! - Previewing sanitization
//! - Managing reporting consent
//! - Inspecting, retrying and clearing locally stored reports
//! - Analyzing a fault log through the monitoring engine
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    analyze::AnalyzeCommand, classify::ClassifyCommand, config::ConfigCommand,
    consent::ConsentCommand, reports::ReportsCommand, sanitize::SanitizeCommand, Context,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "errguard",
    version,
    about = "Fault classification, recovery and privacy-aware error reporting"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify a fault message
    Classify(ClassifyCommand),
    /// Show how text or a URL is sanitized
    Sanitize(SanitizeCommand),
    /// View and change reporting consent
    #[command(subcommand)]
    Consent(ConsentCommand),
    /// Manage locally stored reports
    #[command(subcommand)]
    Reports(ReportsCommand),
    /// Feed a fault log through the monitor and print metrics
    Analyze(AnalyzeCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = Context::new(format, cli.config);

    match cli.command {
        Commands::Classify(cmd) => cmd.execute(&ctx).await,
        Commands::Sanitize(cmd) => cmd.execute(&ctx).await,
        Commands::Consent(cmd) => cmd.execute(&ctx).await,
        Commands::Reports(cmd) => cmd.execute(&ctx).await,
        Commands::Analyze(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_nested_subcommands() {
        let cli = Cli::try_parse_from(["errguard", "--json", "consent", "set", "basic"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Consent(_)));

        let cli = Cli::try_parse_from(["errguard", "analyze", "faults.jsonl", "--prometheus"]).unwrap();
        assert!(matches!(cli.command, Commands::Analyze(_)));
    }
}
