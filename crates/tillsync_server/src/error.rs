//! Error types for the reference backend.

use thiserror::Error;
use tillsync_protocol::ProtocolError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference backend.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Path outside the sync prefix or endpoint not served.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Batch exceeds the configured maximum.
    #[error("batch too large: {size} > {max}")]
    BatchTooLarge {
        /// Items in the batch.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Body could not be decoded or the reply encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::UnknownEndpoint(_)
                | ServerError::BatchTooLarge { .. }
                | ServerError::Protocol(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::UnknownEndpoint("/x".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::BatchTooLarge { size: 12, max: 10 };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("10"));
    }
}
