use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::options::Options;

/// Maximum number of options in one frame (one-byte count).
pub const MAX_OPTIONS: usize = u8::MAX as usize;

/// Maximum option key length in bytes (one-byte prefix).
pub const MAX_KEY_LEN: usize = u8::MAX as usize;

/// Maximum option value length in bytes (two-byte prefix).
pub const MAX_VALUE_LEN: usize = u16::MAX as usize;

/// Maximum payload length in bytes (two-byte prefix).
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Size of a frame with no options and an empty payload.
pub const EMPTY_FRAME_LEN: usize = 1 + 2;

/// Size of the largest legal frame.
pub const MAX_FRAME_LEN: usize =
    EMPTY_FRAME_LEN + MAX_OPTIONS * (1 + MAX_KEY_LEN + 2 + MAX_VALUE_LEN) + MAX_PAYLOAD_LEN;

/// A decoded frame: header options plus an opaque binary payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Header options.
    pub options: Options,
    /// The message payload.
    pub payload: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(options: Options, payload: impl Into<Bytes>) -> Self {
        Self {
            options,
            payload: payload.into(),
        }
    }

    /// Look up a header option.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key)
    }

    /// Encode this message into a frame.
    pub fn encode(&self) -> Result<Bytes> {
        encode_message(&self.options, &self.payload)
    }

    /// Decode a frame into a message.
    pub fn decode(src: impl Into<Bytes>) -> Result<Self> {
        decode_message(src.into())
    }

    /// The number of bytes this message occupies on the wire.
    pub fn wire_size(&self) -> usize {
        EMPTY_FRAME_LEN
            + self
                .options
                .iter()
                .map(|(k, v)| option_wire_size(k, v))
                .sum::<usize>()
            + self.payload.len()
    }
}

fn option_wire_size(key: &str, value: &str) -> usize {
    1 + key.len() + 2 + value.len()
}

fn check_option(key: &str, value: &str) -> Result<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(FrameError::KeyTooLong {
            len: key.len(),
            max: MAX_KEY_LEN,
        });
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(FrameError::ValueTooLong {
            key: key.to_string(),
            len: value.len(),
            max: MAX_VALUE_LEN,
        });
    }
    Ok(())
}

/// Encode one option into `dst`.
///
/// Wire format:
/// ```text
/// ┌─────────────┬──────────────┬───────────────┬────────────────┐
/// │ KeyLen (1B) │ Key (UTF-8)  │ ValueLen      │ Value (UTF-8)  │
/// │             │              │ (2B BE)       │                │
/// └─────────────┴──────────────┴───────────────┴────────────────┘
/// ```
///
/// Nothing is written when a bound is exceeded.
pub fn encode_option(key: &str, value: &str, dst: &mut BytesMut) -> Result<()> {
    check_option(key, value)?;
    put_option(key, value, dst);
    Ok(())
}

fn put_option(key: &str, value: &str, dst: &mut BytesMut) {
    dst.reserve(option_wire_size(key, value));
    dst.put_u8(key.len() as u8);
    dst.put_slice(key.as_bytes());
    dst.put_u16(value.len() as u16);
    dst.put_slice(value.as_bytes());
}

/// Encode options and payload into a frame.
///
/// Wire format:
/// ```text
/// ┌─────────────┬──────────────────┬───────────────┬──────────────────┐
/// │ Count (1B)  │ Option * Count   │ PayloadLen    │ Payload          │
/// │             │                  │ (2B BE)       │ (PayloadLen B)   │
/// └─────────────┴──────────────────┴───────────────┴──────────────────┘
/// ```
///
/// Every bound is checked before the first byte is written, so a failure
/// never yields a partial frame.
pub fn encode_message(options: &Options, payload: &[u8]) -> Result<Bytes> {
    if options.len() > MAX_OPTIONS {
        return Err(FrameError::TooManyOptions {
            count: options.len(),
            max: MAX_OPTIONS,
        });
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut total = EMPTY_FRAME_LEN + payload.len();
    for (key, value) in options {
        check_option(key, value)?;
        total += option_wire_size(key, value);
    }

    let mut dst = BytesMut::with_capacity(total);
    dst.put_u8(options.len() as u8);
    for (key, value) in options {
        put_option(key, value, &mut dst);
    }
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);

    trace!(
        options = options.len(),
        payload = payload.len(),
        size = dst.len(),
        "encoded frame"
    );
    Ok(dst.freeze())
}

/// Bounds-checked reader over a frame buffer.
struct Cursor<'a> {
    src: &'a Bytes,
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a Bytes) -> Self {
        Self { src, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.src.len() - self.offset
    }

    /// Claim the next `len` bytes, failing before any out-of-range access.
    fn take(&mut self, field: &'static str, len: usize) -> Result<std::ops::Range<usize>> {
        if len > self.remaining() {
            return Err(FrameError::Truncated {
                field,
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        let range = self.offset..self.offset + len;
        self.offset += len;
        Ok(range)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8> {
        let range = self.take(field, 1)?;
        Ok(self.src[range.start])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16> {
        let range = self.take(field, 2)?;
        Ok(u16::from_be_bytes([self.src[range.start], self.src[range.start + 1]]))
    }

    fn string(&mut self, field: &'static str, len: usize) -> Result<String> {
        let range = self.take(field, len)?;
        let start = range.start;
        std::str::from_utf8(&self.src[range])
            .map(str::to_owned)
            .map_err(|_| FrameError::InvalidUtf8 {
                field,
                offset: start,
            })
    }
}

/// Decode a complete frame.
///
/// Duplicate option keys resolve last-write-wins. The payload is a view into
/// `src`; no bytes are copied. Any length prefix that points past the end of
/// `src`, and any bytes left after the payload, make the frame malformed.
pub fn decode_message(src: Bytes) -> Result<Message> {
    let mut cursor = Cursor::new(&src);
    let count = cursor.u8("option count")? as usize;

    let mut options = Options::with_capacity(count);
    for _ in 0..count {
        let key_len = cursor.u8("key length")? as usize;
        let key = cursor.string("key", key_len)?;
        let value_len = cursor.u16("value length")? as usize;
        let value = cursor.string("value", value_len)?;
        options.insert(key, value);
    }

    let payload_len = cursor.u16("payload length")? as usize;
    let payload = cursor.take("payload", payload_len)?;

    if cursor.remaining() > 0 {
        return Err(FrameError::TrailingBytes {
            count: cursor.remaining(),
        });
    }

    Ok(Message {
        options,
        payload: src.slice(payload),
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_example_vector() {
        let options = Options::new().with("route", "ping");
        let frame = encode_message(&options, &[0x01, 0x02]).unwrap();

        assert_eq!(
            hex(&frame),
            "01 05 72 6F 75 74 65 00 04 70 69 6E 67 00 02 01 02"
        );

        let message = decode_message(frame).unwrap();
        assert_eq!(message.option("route"), Some("ping"));
        assert_eq!(message.payload.as_ref(), &[0x01, 0x02]);
    }

    #[test]
    fn test_empty_message() {
        let frame = encode_message(&Options::new(), b"").unwrap();
        assert_eq!(frame.as_ref(), &[0x00, 0x00, 0x00]);
        assert_eq!(frame.len(), EMPTY_FRAME_LEN);

        let message = decode_message(frame).unwrap();
        assert!(message.options.is_empty());
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_encode_option_layout() {
        let mut buf = BytesMut::new();
        encode_option("k", "vv", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x01, b'k', 0x00, 0x02, b'v', b'v']);
    }

    #[test]
    fn test_encode_option_oversize_writes_nothing() {
        let mut buf = BytesMut::new();
        let key = "k".repeat(MAX_KEY_LEN + 1);
        let err = encode_option(&key, "v", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::KeyTooLong { len: 256, .. }));
        assert!(err.is_encoding());
        assert!(buf.is_empty());

        let value = "v".repeat(MAX_VALUE_LEN + 1);
        let err = encode_option("k", &value, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ValueTooLong { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_key_bound_counts_utf8_bytes() {
        // 128 two-byte characters: fits in chars, not in bytes.
        let key = "é".repeat(128);
        let err = encode_message(&Options::new().with(key, "v"), b"").unwrap_err();
        assert!(matches!(err, FrameError::KeyTooLong { len: 256, .. }));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let options = Options::new().with("k".repeat(MAX_KEY_LEN), "v".repeat(MAX_VALUE_LEN));
        let payload = vec![0xAB; MAX_PAYLOAD_LEN];
        let frame = encode_message(&options, &payload).unwrap();

        let message = decode_message(frame).unwrap();
        assert_eq!(message.options, options);
        assert_eq!(message.payload.len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn test_too_many_options() {
        let options: Options = (0..=MAX_OPTIONS).map(|i| (i.to_string(), "")).collect();
        let err = encode_message(&options, b"").unwrap_err();
        assert!(matches!(err, FrameError::TooManyOptions { count: 256, .. }));
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let err = encode_message(&Options::new(), &payload).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(err.is_encoding());
        assert!(!err.is_malformed());
    }

    #[test]
    fn test_decode_duplicate_keys_last_write_wins() {
        let mut options = Options::new();
        options.push("token", "old");
        options.push("route", "ping");
        options.push("token", "new");
        let frame = encode_message(&options, b"").unwrap();

        let message = decode_message(frame).unwrap();
        assert_eq!(message.options.len(), 2);
        assert_eq!(message.option("token"), Some("new"));
    }

    #[test]
    fn test_decode_empty_input() {
        let err = decode_message(Bytes::new()).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                field: "option count",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_length_past_end() {
        // One option whose key claims 200 bytes, only 3 present.
        let src = Bytes::from_static(&[0x01, 200, b'a', b'b', b'c']);
        let err = decode_message(src).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                field: "key",
                offset: 2,
                needed: 200,
                available: 3,
            }
        ));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut src = BytesMut::from(&[0x00, 0x00, 0x01, 0xFF][..]);
        src.put_u8(0xEE);
        let err = decode_message(src.freeze()).unwrap_err();
        assert!(matches!(err, FrameError::TrailingBytes { count: 1 }));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let src = Bytes::from_static(&[0x01, 0x01, 0xFF, 0x00, 0x00, 0x00, 0x00]);
        let err = decode_message(src).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidUtf8 {
                field: "key",
                offset: 2
            }
        ));
    }

    #[test]
    fn test_payload_is_a_view() {
        let frame = encode_message(&Options::new().with("a", "b"), b"view").unwrap();
        let base = frame.as_ptr() as usize;
        let end = base + frame.len();

        let message = decode_message(frame.clone()).unwrap();
        let start = message.payload.as_ptr() as usize;
        assert!(start >= base && start + message.payload.len() <= end);
    }

    #[test]
    fn test_wire_size_matches_encoding() {
        let message = Message::new(
            Options::new().with("route", "fs.read").with("path", "/tmp/ü"),
            Bytes::from_static(b"body"),
        );
        assert_eq!(message.encode().unwrap().len(), message.wire_size());
    }

    fn option_entries() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec((".{0,24}", ".{0,64}"), 0..16).prop_filter(
            "keys must fit one length byte",
            |entries| entries.iter().all(|(k, _)| k.len() <= MAX_KEY_LEN),
        )
    }

    proptest! {
        #[test]
        fn prop_roundtrip(entries in option_entries(), payload in prop::collection::vec(any::<u8>(), 0..512)) {
            let options: Options = entries.into_iter().collect();
            let frame = encode_message(&options, &payload).unwrap();
            let message = decode_message(frame).unwrap();

            prop_assert_eq!(message.options, options);
            prop_assert_eq!(message.payload.as_ref(), payload.as_slice());
        }

        #[test]
        fn prop_strict_prefix_is_malformed(entries in option_entries(), payload in prop::collection::vec(any::<u8>(), 0..64), cut in any::<prop::sample::Index>()) {
            let options: Options = entries.into_iter().collect();
            let frame = encode_message(&options, &payload).unwrap();
            let len = cut.index(frame.len());

            let err = decode_message(frame.slice(..len)).unwrap_err();
            prop_assert!(err.is_malformed(), "unexpected error: {}", err);
        }
    }
}
