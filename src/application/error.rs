//! Application-level errors (wraps domain and transport errors)

use thiserror::Error;

use crate::domain::{CommandKind, DomainError, NodeId};
use crate::infrastructure::TransportError;

/// Why a gated command was discarded.
///
/// Every variant means the same thing for the tree: nothing was applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("no url configured for {0} command")]
    MissingUrl(CommandKind),

    #[error("{command} command failed: {source}")]
    Transport {
        command: CommandKind,
        #[source]
        source: TransportError,
    },

    #[error("{command} command rejected with status {status}")]
    Status { command: CommandKind, status: u16 },

    #[error("{0} command rejected by response body")]
    Rejected(CommandKind),

    #[error("{command} command target {id} no longer exists")]
    TargetVanished { command: CommandKind, id: NodeId },

    #[error("{command} command no longer applies: {message}")]
    Conflict {
        command: CommandKind,
        message: String,
    },

    #[error("{command} response is not tree data: {message}")]
    InvalidPayload {
        command: CommandKind,
        message: String,
    },
}

impl SyncError {
    pub fn command(&self) -> CommandKind {
        match self {
            SyncError::MissingUrl(command) | SyncError::Rejected(command) => *command,
            SyncError::Transport { command, .. }
            | SyncError::Status { command, .. }
            | SyncError::TargetVanished { command, .. }
            | SyncError::Conflict { command, .. }
            | SyncError::InvalidPayload { command, .. } => *command,
        }
    }
}

/// Result type for gated command operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Application errors wrap domain and sync errors and add configuration problems.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("config error: {message}")]
    Config { message: String },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
