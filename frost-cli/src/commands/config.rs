//! `frost config`: inspect and edit `config.ini`.

use clap::Subcommand;
use frost::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one value, e.g. `frost config get downloader.chunk_size`
    Get { key: String },

    /// Validate and store one value, e.g. `frost config set server.url http://nas:6699/dl`
    Set { key: String, value: String },

    /// Print every key with its effective value
    List,

    /// Print where the configuration file lives
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = lookup(&key)?;
            println!("{}", shown(key.get(&ConfigFile::load()?)));
        }
        ConfigCommands::Set { key, value } => {
            let key = lookup(&key)?;
            let mut config = ConfigFile::load()?;
            key.set(&mut config, &value)?;
            config.save()?;
            println!("{} = {}", key.name(), shown(key.display(&config)));
        }
        ConfigCommands::List => {
            let stored = ConfigFile::load()?;
            let effective = stored.clone().with_env_overrides()?;
            println!("# {}", config_file_path().display());
            for line in table(&stored, &effective) {
                println!("{line}");
            }
        }
        ConfigCommands::Path => println!("{}", config_file_path().display()),
    }
    Ok(())
}

fn lookup(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        let known: Vec<String> = ConfigKey::all().iter().map(ConfigKey::name).collect();
        CliError::Config(format!(
            "unknown key '{key}', expected one of: {}",
            known.join(", ")
        ))
    })
}

fn shown(value: String) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else {
        value
    }
}

/// One aligned `section.key  value` line per key, flagging values that an
/// environment variable overrides.
fn table(stored: &ConfigFile, effective: &ConfigFile) -> Vec<String> {
    let width = ConfigKey::all()
        .iter()
        .map(|key| key.name().len())
        .max()
        .unwrap_or(0);

    ConfigKey::all()
        .iter()
        .map(|key| {
            let value = shown(key.display(effective));
            if key.get(stored) == key.get(effective) {
                format!("{:<width$}  {value}", key.name())
            } else {
                format!("{:<width$}  {value}  (environment)", key.name())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_every_key_aligned() {
        let config = ConfigFile::default();
        let lines = table(&config, &config);

        assert_eq!(lines.len(), ConfigKey::all().len());
        assert!(lines[0].starts_with("server.url "));
        let value_column = lines[0].len() - shown(ConfigKey::ServerUrl.display(&config)).len();
        for (line, key) in lines.iter().zip(ConfigKey::all()) {
            assert_eq!(
                line.len() - shown(key.display(&config)).len(),
                value_column,
                "{line}"
            );
            assert!(!line.contains("(environment)"));
        }
    }

    #[test]
    fn test_table_flags_environment_overrides() {
        let stored = ConfigFile::default();
        let mut effective = stored.clone();
        ConfigKey::DownloaderMaxConcurrentFiles
            .set(&mut effective, "9")
            .unwrap();

        let lines = table(&stored, &effective);
        let flagged: Vec<&String> = lines.iter().filter(|l| l.contains("(environment)")).collect();
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].starts_with("downloader.max_concurrent_files"));
        assert!(flagged[0].contains(" 9 "));
    }

    #[test]
    fn test_unknown_key_lists_known_keys() {
        let err = lookup("server.nope").unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }
}
