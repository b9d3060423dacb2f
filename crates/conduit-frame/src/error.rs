/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An option key does not fit its one-byte length prefix.
    #[error("option key too long ({len} bytes, max {max})")]
    KeyTooLong { len: usize, max: usize },

    /// An option value does not fit its two-byte length prefix.
    #[error("option value for '{key}' too long ({len} bytes, max {max})")]
    ValueTooLong { key: String, len: usize, max: usize },

    /// More options than the one-byte option count can describe.
    #[error("too many options ({count}, max {max})")]
    TooManyOptions { count: usize, max: usize },

    /// The payload does not fit its two-byte length prefix.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A length prefix points past the end of the input buffer.
    #[error("malformed frame: {field} needs {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// An option key or value is not valid UTF-8.
    #[error("malformed frame: {field} at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str, offset: usize },

    /// Bytes remain after the declared payload.
    #[error("malformed frame: {count} trailing bytes after payload")]
    TrailingBytes { count: usize },

    /// The stream envelope header contains an invalid magic number.
    #[error("invalid envelope magic (expected 0x4344 \"CD\")")]
    InvalidMagic,

    /// The stream envelope announces a frame larger than allowed.
    #[error("envelope too large ({size} bytes, max {max})")]
    EnvelopeTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing envelopes.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for errors raised on the encode path because an input exceeds its wire bound.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            Self::KeyTooLong { .. }
                | Self::ValueTooLong { .. }
                | Self::TooManyOptions { .. }
                | Self::PayloadTooLarge { .. }
        )
    }

    /// True for errors raised on the decode path because the input is not a well-formed frame.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. } | Self::InvalidUtf8 { .. } | Self::TrailingBytes { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
