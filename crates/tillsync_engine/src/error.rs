//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The seller's plan or session no longer allows syncing.
    #[error("plan or session invalid: {0}")]
    PlanInvalid(String),

    /// No seller/session context could be resolved.
    #[error("no seller context available")]
    MissingSession,

    /// Connectivity is unavailable.
    #[error("not connected to server")]
    Offline,

    /// Local record store failure.
    #[error("store error for {entity}: {message}")]
    Store {
        /// Entity type whose store failed.
        entity: String,
        /// Error message.
        message: String,
    },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Server rejected the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// Invalid engine setup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a store error for an entity type.
    pub fn store(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }
}

impl From<tillsync_protocol::ProtocolError> for SyncError {
    fn from(err: tillsync_protocol::ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
