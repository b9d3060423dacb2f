//! Binary frame codec for conduit messages.
//!
//! Every message is one frame:
//! - A 1-byte option count
//! - That many options, each a 1-byte key length, the key, a 2-byte
//!   big-endian value length and the value (both UTF-8)
//! - A 2-byte big-endian payload length and the payload bytes
//!
//! Encoding rejects anything that does not fit its length prefix; decoding
//! checks every prefix against the buffer before reading.

pub mod codec;
#[cfg(feature = "async")]
pub mod envelope;
pub mod error;
pub mod options;

pub use codec::{
    decode_message, encode_message, encode_option, Message, EMPTY_FRAME_LEN, MAX_FRAME_LEN,
    MAX_KEY_LEN, MAX_OPTIONS, MAX_PAYLOAD_LEN, MAX_VALUE_LEN,
};
#[cfg(feature = "async")]
pub use envelope::{EnvelopeCodec, EnvelopeConfig, ENVELOPE_HEADER_SIZE};
pub use error::{FrameError, Result};
pub use options::Options;
