//! Frost CLI - command-line interface
//!
//! Download games from a Frost library server, serve a library, and inspect
//! manifests and transfer progress.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "frost", version, about = "Resumable game library mirroring")]
struct Cli {
    /// Log at debug level (overrides RUST_LOG and logging.level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a game from the library server, resuming earlier progress
    Download {
        /// Game id on the server
        game_id: u64,

        /// Base URL of the server's transfer endpoints
        #[arg(long)]
        server: Option<String>,

        /// Download root; the game lands in <dest>/<game-id>
        #[arg(long)]
        dest: Option<PathBuf>,
    },

    /// Serve the game library to clients
    Serve {
        /// Listen address (host:port)
        #[arg(long)]
        listen: Option<String>,

        /// Library root holding one folder per game id
        #[arg(long)]
        library: Option<PathBuf>,

        /// Skip generating missing manifests at startup
        #[arg(long)]
        no_backfill: bool,
    },

    /// Generate or refresh a game's manifest and show what changed
    Scan {
        /// Game id in the library
        game_id: u64,

        /// Library root holding one folder per game id
        #[arg(long)]
        library: Option<PathBuf>,
    },

    /// Show per-file chunk progress of a download folder
    Progress {
        /// Game download folder (the one holding .frost.cache)
        folder: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", console::style("error:").red().bold(), e);
            e.exit_code()
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Download {
            game_id,
            server,
            dest,
        } => commands::download::run(commands::download::DownloadArgs {
            game_id,
            server,
            dest,
            verbose: cli.verbose,
        }),
        Commands::Serve {
            listen,
            library,
            no_backfill,
        } => commands::serve::run(commands::serve::ServeArgs {
            listen,
            library,
            no_backfill,
            verbose: cli.verbose,
        }),
        Commands::Scan { game_id, library } => {
            commands::scan::run(game_id, library, cli.verbose)
        }
        Commands::Progress { folder, json } => commands::progress::run(&folder, json),
        Commands::Config { command } => commands::config::run(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "frost",
            "download",
            "42",
            "--server",
            "http://nas:6699/dl",
            "--dest",
            "/games",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Download {
                game_id,
                server,
                dest,
            } => {
                assert_eq!(game_id, 42);
                assert_eq!(server.as_deref(), Some("http://nas:6699/dl"));
                assert_eq!(dest, Some(PathBuf::from("/games")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_non_numeric_game_id() {
        assert!(Cli::try_parse_from(["frost", "scan", "abc"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        use frost::download::TransferStatus;

        let cancelled = CliError::Transfer {
            game_id: 1,
            status: TransferStatus::Cancelled,
            message: String::new(),
        };
        assert_eq!(cancelled.exit_code(), ExitCode::from(130));
        assert_eq!(
            CliError::Config("bad".to_string()).exit_code(),
            ExitCode::from(2)
        );
    }
}
