//! Shared command setup: configuration and logging.

use std::path::Path;

use tiledist::config::{config_file_path, ConfigFile};
use tiledist::logging::{init_logging, WorkerGuard};
use tracing::info;

use crate::error::CliError;

/// Loads configuration and installs logging for a command.
///
/// Holds the log writer guard; keep the runner alive until the command ends.
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Loads `config_path`, or the default configuration file.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };
        let log_guard = init_logging(&config.logging)?;
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            version = tiledist::VERSION,
            command,
            config = %config_file_path().display(),
            "tiledist starting"
        );
    }
}
