//! Configuration file handling.
//!
//! Settings live in an INI file at `<config dir>/frost/config.ini`. A missing
//! file means defaults; a few settings can be overridden from the
//! environment.
//!
//! # Example Configuration (INI)
//!
//! ```ini
//! [server]
//! url = http://nas.local:6699/api/server/library/download
//! listen = 0.0.0.0:6699
//! library_root = /srv/games
//!
//! [downloader]
//! download_dir = /home/me/Games
//! chunk_size = 128MiB
//! max_concurrent_files = 50
//! max_concurrent_chunks = 100
//! chunk_timeout_secs = 1800
//!
//! [logging]
//! level = info
//! file = /var/log/frost/frost.log
//! ```

mod keys;
mod size;

pub use keys::ConfigKey;
pub use size::{format_size, parse_size};

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::download::{
    default_download_dir, DownloaderConfig, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_CHUNKS, DEFAULT_MAX_CONCURRENT_FILES, DEFAULT_SERVER_URL,
};
use crate::server::{ServerConfig, DEFAULT_LISTEN};

/// Environment variable overriding `server.url`.
pub const ENV_SERVER_URL: &str = "FROST_SERVER_URL";
/// Environment variable overriding `downloader.max_concurrent_files`.
pub const ENV_MAX_FILES: &str = "FROST_MAX_FILES";
/// Environment variable overriding `downloader.max_concurrent_chunks`.
pub const ENV_MAX_CHUNKS: &str = "FROST_MAX_CHUNKS";
/// Environment variable overriding `downloader.chunk_size`.
pub const ENV_CHUNK_SIZE: &str = "FROST_CHUNK_SIZE";

/// Errors from loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {reason}", .path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write config file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0} is not set")]
    Missing(String),

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSection {
    /// Base URL of a remote server's transfer endpoints.
    pub url: String,
    /// Listen address when serving.
    pub listen: String,
    /// Game library served by this host.
    pub library_root: Option<PathBuf>,
    /// Manifest database directory.
    pub manifest_db: PathBuf,
}

/// `[downloader]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderSection {
    pub download_dir: PathBuf,
    pub chunk_size: u64,
    pub max_concurrent_files: usize,
    pub max_concurrent_chunks: usize,
    pub chunk_timeout_secs: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSection {
    /// Filter directive such as `info` or `frost=debug`.
    pub level: String,
    /// Log file; logging goes to stderr only when unset.
    pub file: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub downloader: DownloaderSection,
    pub logging: LoggingSection,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            server: ServerSection {
                url: DEFAULT_SERVER_URL.to_string(),
                listen: DEFAULT_LISTEN.to_string(),
                library_root: None,
                manifest_db: data_dir().join("manifests"),
            },
            downloader: DownloaderSection {
                download_dir: default_download_dir(),
                chunk_size: DEFAULT_CHUNK_SIZE,
                max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
                max_concurrent_chunks: DEFAULT_MAX_CONCURRENT_CHUNKS,
                chunk_timeout_secs: DEFAULT_CHUNK_TIMEOUT.as_secs(),
            },
            logging: LoggingSection {
                level: "info".to_string(),
                file: None,
            },
        }
    }
}

/// `<config dir>/frost`
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("frost")
}

/// `<config dir>/frost/config.ini`
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// `<data dir>/frost`
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("frost")
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|s| s.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }

        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Write every setting to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }

        ini.write_to_file(path).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply `FROST_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            (ENV_SERVER_URL, ConfigKey::ServerUrl),
            (ENV_MAX_FILES, ConfigKey::DownloaderMaxConcurrentFiles),
            (ENV_MAX_CHUNKS, ConfigKey::DownloaderMaxConcurrentChunks),
            (ENV_CHUNK_SIZE, ConfigKey::DownloaderChunkSize),
        ];

        for (var, key) in overrides {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                key.set(&mut self, &value).map_err(|e| match e {
                    ConfigError::InvalidValue { value, reason, .. } => ConfigError::InvalidValue {
                        key: var.to_string(),
                        value,
                        reason,
                    },
                    other => other,
                })?;
            }
        }

        Ok(self)
    }

    /// Settings for client-side transfers.
    pub fn downloader_config(&self) -> DownloaderConfig {
        DownloaderConfig::new(&self.server.url)
            .with_download_dir(&self.downloader.download_dir)
            .with_chunk_size(self.downloader.chunk_size)
            .with_max_concurrent_files(self.downloader.max_concurrent_files)
            .with_max_concurrent_chunks(self.downloader.max_concurrent_chunks)
            .with_chunk_timeout(Duration::from_secs(self.downloader.chunk_timeout_secs))
    }

    /// Settings for the transfer server. Requires `server.library_root`.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let library_root = self
            .server
            .library_root
            .clone()
            .ok_or_else(|| ConfigError::Missing(ConfigKey::ServerLibraryRoot.name()))?;

        let listen: SocketAddr =
            self.server
                .listen
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                    key: ConfigKey::ServerListen.name(),
                    value: self.server.listen.clone(),
                    reason: e.to_string(),
                })?;

        Ok(ServerConfig::new(library_root, &self.server.manifest_db).with_listen(listen))
    }
}
