//! CLI command implementations

pub mod analyze;
pub mod classify;
pub mod config;
pub mod consent;
pub mod reports;
pub mod sanitize;

use std::path::PathBuf;

use anyhow::Result;
use errguard::ErrorGuard;
use errguard_core::config::Config;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Options shared by every command
pub struct Context {
    pub format: OutputFormat,
    config_path: Option<PathBuf>,
}

impl Context {
    pub fn new(format: OutputFormat, config_path: Option<PathBuf>) -> Self {
        Self {
            format,
            config_path,
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_path.clone().unwrap_or_else(Config::default_path)
    }

    pub fn load_config(&self) -> Config {
        let path = self.config_path();
        tracing::debug!(config_path = %path.display(), "Loading configuration");
        Config::load_or_default(&path)
    }

    /// Opens the persistent state through the composition root
    pub async fn open_guard(&self) -> Result<ErrorGuard> {
        ErrorGuard::from_config(self.load_config()).await
    }
}
