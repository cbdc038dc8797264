//! Transfer status tracking.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one game transfer.
///
/// ```text
/// Queued -> Metadata -> Downloading -> Complete
///              |             |------> Error
///              |-------------|------> Cancelled
///              '--> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Queued,
    Metadata,
    Downloading,
    Complete,
    Error,
    Cancelled,
}

impl TransferStatus {
    /// Whether no further transitions follow.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Metadata => "metadata",
            Self::Downloading => "downloading",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Snapshot pushed to a progress sink on every status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub game_id: u64,
    pub status: TransferStatus,
    /// Human-readable detail, the failure reason for `Error`.
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// Initial `Queued` update for a new transfer.
    pub fn queued(game_id: u64) -> Self {
        let now = Utc::now();
        Self {
            game_id,
            status: TransferStatus::Queued,
            message: String::new(),
            started_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Move to `status`, stamping `updated_at` and, for terminal states, `finished_at`.
    pub fn transition(&mut self, status: TransferStatus, message: impl Into<String>) {
        let now = Utc::now();
        self.status = status;
        self.message = message.into();
        self.updated_at = now;
        if status.is_terminal() {
            self.finished_at = Some(now);
        }
    }
}
