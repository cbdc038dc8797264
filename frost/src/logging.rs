//! Tracing subscriber setup.
//!
//! Logs go to stderr and, when a log file is configured, to a daily-rotated
//! file through a non-blocking writer. The returned [`LogGuard`] must be kept
//! alive for the life of the process so buffered file output is flushed.

use std::path::{Path, PathBuf};

use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSection;
use crate::error::{SyncError, SyncResult};

/// Keeps the file writer thread alive.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Logging options resolved from the command line and config.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Force `debug` regardless of the configured level.
    pub verbose: bool,
    /// Daily-rotated log file.
    pub file: Option<PathBuf>,
}

impl From<&LoggingSection> for LogOptions {
    fn from(section: &LoggingSection) -> Self {
        Self {
            level: section.level.clone(),
            verbose: false,
            file: section.file.clone(),
        }
    }
}

impl LogOptions {
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else if self.level.trim().is_empty() {
            "info"
        } else {
            self.level.trim()
        }
    }

    fn filter(&self) -> SyncResult<EnvFilter> {
        if !self.verbose {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        EnvFilter::try_new(self.directive()).map_err(|e| SyncError::Init {
            component: "logging",
            reason: format!("invalid log level '{}': {e}", self.directive()),
        })
    }
}

/// Install the global subscriber.
pub fn init(options: &LogOptions) -> SyncResult<LogGuard> {
    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(UtcOffset::UTC, Rfc3339));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(false)
        .boxed();

    let (file_layer, file_guard) = match &options.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(options.filter()?)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SyncError::Init {
            component: "logging",
            reason: e.to_string(),
        })?;

    Ok(LogGuard { _file: file_guard })
}

fn file_writer(path: &Path) -> SyncResult<(NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .ok_or_else(|| {
            SyncError::InvalidConfig(format!("log file {} has no name", path.display()))
        })?;

    std::fs::create_dir_all(dir).map_err(|e| SyncError::CreateDirFailed {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let appender = tracing_appender::rolling::daily(dir, name);
    Ok(tracing_appender::non_blocking(appender))
}
