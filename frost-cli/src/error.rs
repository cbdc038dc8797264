//! CLI error type.

use std::process::ExitCode;

use frost::config::ConfigError;
use frost::download::TransferStatus;
use frost::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("failed to start runtime: {0}")]
    Runtime(String),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transfer of game {game_id} ended as {status}: {message}")]
    Transfer {
        game_id: u64,
        status: TransferStatus,
        message: String,
    },
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl CliError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Config(_) => ExitCode::from(2),
            CliError::Transfer {
                status: TransferStatus::Cancelled,
                ..
            } => ExitCode::from(130),
            _ => ExitCode::FAILURE,
        }
    }
}
