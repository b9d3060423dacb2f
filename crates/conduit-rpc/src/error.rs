use std::time::Duration;

use conduit_transport::{SharedError, TransportError};

/// Errors a request can settle with.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The connection failed or closed. Every pending call on it sees this.
    #[error("transport error: {0}")]
    Transport(SharedError),

    /// This request could not be encoded or queued.
    #[error("send failed: {0}")]
    Send(#[from] TransportError),

    /// The peer answered with an `err` field.
    #[error("remote error: {message}")]
    Application {
        message: String,
        /// The `err` value as received.
        err: serde_json::Value,
    },

    /// No matching response arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Caller options may not use a name the protocol sets itself.
    #[error("option '{0}' is reserved")]
    ReservedOption(String),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// True if the connection is gone and no further request can succeed on it.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Transport(_)) || matches!(self, Self::Send(TransportError::Closed))
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
