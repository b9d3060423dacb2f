use std::time::Duration;

use conduit_frame::FrameError;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The origin is not a supported `scheme://address` form.
    #[error("invalid origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },

    /// The endpoint path could not be parsed.
    #[error("invalid endpoint path '{path}': {reason}")]
    InvalidEndpoint { path: String, reason: String },

    /// Failed to connect to the endpoint.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: std::io::Error,
    },

    /// Failed to bind to the specified origin.
    #[error("failed to bind to {origin}: {source}")]
    Bind {
        origin: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The connection hello was missing, malformed or rejected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The transport did not open in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// False only for failures scoped to a single inbound frame.
    ///
    /// A terminal error ends the connection; every listener sees it once.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Frame(err) if err.is_malformed())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
