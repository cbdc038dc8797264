//! Shared command setup: configuration and logging.

use frost::config::{config_file_path, ConfigFile};
use frost::logging::{self, LogGuard, LogOptions};
use tracing::{debug, info};

use crate::error::CliError;

/// Loaded configuration plus the live logging guard.
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: LogGuard,
}

impl CliRunner {
    /// Load config (file, then `FROST_*` overrides) and install logging.
    pub fn new(verbose: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?.with_env_overrides()?;
        let log_guard = logging::init(&LogOptions::from(&config.logging).with_verbose(verbose))?;

        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(version = frost::VERSION, command, "frost starting");
        debug!(config = %config_file_path().display(), "configuration loaded");
    }
}
