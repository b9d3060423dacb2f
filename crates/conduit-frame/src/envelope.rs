//! Stream envelope for carrying whole frames over byte-stream transports.
//!
//! TCP and Unix domain sockets do not keep message boundaries, so each frame
//! is wrapped in a fixed header before it goes on the stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::MAX_FRAME_LEN;
use crate::error::{FrameError, Result};

/// Envelope header: magic (2) + length (4) = 6 bytes.
pub const ENVELOPE_HEADER_SIZE: usize = 6;

/// Magic bytes: "CD" (0x43 0x44).
pub const ENVELOPE_MAGIC: [u8; 2] = [0x43, 0x44];

/// Configuration for the envelope codec.
#[derive(Debug, Clone)]
pub struct EnvelopeConfig {
    /// Largest frame accepted inside one envelope. Default: [`MAX_FRAME_LEN`].
    pub max_frame_size: usize,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_LEN,
        }
    }
}

/// Write one envelope around `frame`.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Frame           │
/// │ 0x43 0x44    │ (4B LE)   │ (Length bytes)  │
/// └──────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_envelope(frame: &[u8], dst: &mut BytesMut, max_frame_size: usize) -> Result<()> {
    if frame.len() > max_frame_size {
        return Err(FrameError::EnvelopeTooLarge {
            size: frame.len(),
            max: max_frame_size,
        });
    }
    dst.reserve(ENVELOPE_HEADER_SIZE + frame.len());
    dst.put_slice(&ENVELOPE_MAGIC);
    dst.put_u32_le(frame.len() as u32);
    dst.put_slice(frame);
    Ok(())
}

/// Take one envelope off the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete envelope yet.
pub fn decode_envelope(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Bytes>> {
    if src.len() < ENVELOPE_HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != ENVELOPE_MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let frame_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if frame_len > max_frame_size {
        return Err(FrameError::EnvelopeTooLarge {
            size: frame_len,
            max: max_frame_size,
        });
    }

    let total = ENVELOPE_HEADER_SIZE + frame_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(ENVELOPE_HEADER_SIZE);
    Ok(Some(src.split_to(frame_len).freeze()))
}

/// `tokio_util` codec yielding one encoded frame per envelope.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeCodec {
    config: EnvelopeConfig,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EnvelopeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        decode_envelope(src, self.config.max_frame_size)
    }
}

impl Encoder<Bytes> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_envelope(&item, dst, self.config.max_frame_size)
    }
}
