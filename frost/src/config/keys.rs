//! Dotted configuration keys (`section.key`) for get/set access.

use std::path::PathBuf;
use std::str::FromStr;

use super::size::{format_size, parse_size};
use super::{ConfigError, ConfigFile};

/// Every setting addressable as `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    ServerUrl,
    ServerListen,
    ServerLibraryRoot,
    ServerManifestDb,
    DownloaderDownloadDir,
    DownloaderChunkSize,
    DownloaderMaxConcurrentFiles,
    DownloaderMaxConcurrentChunks,
    DownloaderChunkTimeoutSecs,
    LoggingLevel,
    LoggingFile,
}

const ALL_KEYS: [ConfigKey; 11] = [
    ConfigKey::ServerUrl,
    ConfigKey::ServerListen,
    ConfigKey::ServerLibraryRoot,
    ConfigKey::ServerManifestDb,
    ConfigKey::DownloaderDownloadDir,
    ConfigKey::DownloaderChunkSize,
    ConfigKey::DownloaderMaxConcurrentFiles,
    ConfigKey::DownloaderMaxConcurrentChunks,
    ConfigKey::DownloaderChunkTimeoutSecs,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingFile,
];

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        &ALL_KEYS
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::ServerUrl
            | Self::ServerListen
            | Self::ServerLibraryRoot
            | Self::ServerManifestDb => "server",
            Self::DownloaderDownloadDir
            | Self::DownloaderChunkSize
            | Self::DownloaderMaxConcurrentFiles
            | Self::DownloaderMaxConcurrentChunks
            | Self::DownloaderChunkTimeoutSecs => "downloader",
            Self::LoggingLevel | Self::LoggingFile => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::ServerUrl => "url",
            Self::ServerListen => "listen",
            Self::ServerLibraryRoot => "library_root",
            Self::ServerManifestDb => "manifest_db",
            Self::DownloaderDownloadDir => "download_dir",
            Self::DownloaderChunkSize => "chunk_size",
            Self::DownloaderMaxConcurrentFiles => "max_concurrent_files",
            Self::DownloaderMaxConcurrentChunks => "max_concurrent_chunks",
            Self::DownloaderChunkTimeoutSecs => "chunk_timeout_secs",
            Self::LoggingLevel => "level",
            Self::LoggingFile => "file",
        }
    }

    /// `section.key`
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as it would be written to the file. Unset values are empty.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            Self::ServerUrl => config.server.url.clone(),
            Self::ServerListen => config.server.listen.clone(),
            Self::ServerLibraryRoot => optional_path(&config.server.library_root),
            Self::ServerManifestDb => config.server.manifest_db.display().to_string(),
            Self::DownloaderDownloadDir => config.downloader.download_dir.display().to_string(),
            Self::DownloaderChunkSize => {
                let size = config.downloader.chunk_size;
                if size % (1 << 20) == 0 {
                    format!("{}MiB", size >> 20)
                } else {
                    size.to_string()
                }
            }
            Self::DownloaderMaxConcurrentFiles => {
                config.downloader.max_concurrent_files.to_string()
            }
            Self::DownloaderMaxConcurrentChunks => {
                config.downloader.max_concurrent_chunks.to_string()
            }
            Self::DownloaderChunkTimeoutSecs => config.downloader.chunk_timeout_secs.to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
            Self::LoggingFile => optional_path(&config.logging.file),
        }
    }

    /// Validate `value` and store it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match self {
            Self::ServerUrl => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(invalid("expected an http:// or https:// URL"));
                }
                config.server.url = value.trim_end_matches('/').to_string();
            }
            Self::ServerListen => {
                value
                    .parse::<std::net::SocketAddr>()
                    .map_err(|_| invalid("expected host:port"))?;
                config.server.listen = value.to_string();
            }
            Self::ServerLibraryRoot => config.server.library_root = non_empty_path(value),
            Self::ServerManifestDb => {
                config.server.manifest_db =
                    non_empty_path(value).ok_or_else(|| invalid("path must not be empty"))?;
            }
            Self::DownloaderDownloadDir => {
                config.downloader.download_dir =
                    non_empty_path(value).ok_or_else(|| invalid("path must not be empty"))?;
            }
            Self::DownloaderChunkSize => {
                config.downloader.chunk_size = parse_size(value)
                    .filter(|&n| n > 0)
                    .ok_or_else(|| invalid("expected a positive size such as 128MiB"))?;
            }
            Self::DownloaderMaxConcurrentFiles => {
                config.downloader.max_concurrent_files =
                    positive(value).ok_or_else(|| invalid("expected a positive integer"))?;
            }
            Self::DownloaderMaxConcurrentChunks => {
                config.downloader.max_concurrent_chunks =
                    positive(value).ok_or_else(|| invalid("expected a positive integer"))?;
            }
            Self::DownloaderChunkTimeoutSecs => {
                config.downloader.chunk_timeout_secs = value
                    .parse::<u64>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| invalid("expected a positive number of seconds"))?;
            }
            Self::LoggingLevel => {
                if value.is_empty() {
                    return Err(invalid("level must not be empty"));
                }
                config.logging.level = value.to_string();
            }
            Self::LoggingFile => config.logging.file = non_empty_path(value),
        }

        Ok(())
    }

    /// Human-readable form of the current value, for listings.
    pub fn display(&self, config: &ConfigFile) -> String {
        match self {
            Self::DownloaderChunkSize => format_size(config.downloader.chunk_size),
            _ => self.get(config),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn optional_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn positive(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        for key in ConfigKey::all() {
            assert_eq!(key.name().parse::<ConfigKey>().unwrap(), *key);
        }
        assert!("server.nope".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_set_then_get() {
        let mut config = ConfigFile::default();

        ConfigKey::DownloaderChunkSize
            .set(&mut config, "64M")
            .unwrap();
        assert_eq!(ConfigKey::DownloaderChunkSize.get(&config), "64MiB");
        assert_eq!(ConfigKey::DownloaderChunkSize.display(&config), "64.0 MiB");

        ConfigKey::ServerUrl
            .set(&mut config, "http://peer:6699/dl/")
            .unwrap();
        assert_eq!(ConfigKey::ServerUrl.get(&config), "http://peer:6699/dl");
    }

    #[test]
    fn test_set_rejects_invalid() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::ServerUrl.set(&mut config, "ftp://x").is_err());
        assert!(ConfigKey::ServerListen.set(&mut config, "nowhere").is_err());
        assert!(ConfigKey::DownloaderMaxConcurrentFiles
            .set(&mut config, "0")
            .is_err());
        assert!(ConfigKey::DownloaderChunkSize.set(&mut config, "0").is_err());
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_optional_paths_clear() {
        let mut config = ConfigFile::default();
        ConfigKey::LoggingFile
            .set(&mut config, "/var/log/frost.log")
            .unwrap();
        assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/frost.log")));

        ConfigKey::LoggingFile.set(&mut config, "").unwrap();
        assert_eq!(config.logging.file, None);
        assert_eq!(ConfigKey::LoggingFile.get(&config), "");
    }
}
