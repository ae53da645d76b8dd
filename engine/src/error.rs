//! Engine error types
//!
//! Only failures of the external capabilities are errors. Validation and
//! conflict outcomes are returned as `Outcome::Rejected` and never reach
//! this type.

use shared::{EntityKind, SharedError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Persistence call failed: {operation} {kind}: {message}")]
    PersistenceFailed {
        kind: EntityKind,
        operation: String,
        message: String,
    },

    #[error("Remote service answered {status} to {operation}: {body}")]
    RemoteStatus {
        status: u16,
        operation: String,
        body: String,
    },

    #[error("Remote service returned a {actual} where a {expected} was expected")]
    UnexpectedKind { expected: EntityKind, actual: EntityKind },

    #[error("Change feed error: {message}")]
    FeedError { message: String },

    #[error("Configuration error: {field}: {reason}")]
    ConfigurationError { field: String, reason: String },

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl SyncError {
    pub fn persistence(kind: EntityKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::PersistenceFailed {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::ConfigurationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether repeating the same call may succeed. The engine never retries
    /// on its own; callers use this to decide.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::PersistenceFailed { .. } | SyncError::FeedError { .. } | SyncError::WebSocket(_) => true,
            SyncError::RemoteStatus { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            SyncError::Transport(e) => e.is_timeout() || e.is_connect(),
            SyncError::UnexpectedKind { .. }
            | SyncError::ConfigurationError { .. }
            | SyncError::SharedError(_)
            | SyncError::JsonError(_) => false,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
