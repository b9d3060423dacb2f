//! Session ids and endpoint addressing.
//!
//! A connection is addressed as `{origin}/{sessionId}/0?key={accessKey}`.
//! The session id is a uniformly random `u32`; it tells concurrent
//! connections apart and is not a credential.

use std::fmt;

use crate::error::{Result, TransportError};

/// Fixed sub-path that follows the session id.
pub const SESSION_SUBPATH: &str = "0";

/// Draw a fresh session id.
pub fn session_id() -> u32 {
    rand::random()
}

/// Where a connection goes and who it claims to be.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    origin: String,
    session_id: u32,
    access_key: String,
}

/// Session id and access key recovered from an endpoint path.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionPath {
    pub session_id: u32,
    pub access_key: String,
}

impl Endpoint {
    /// Create an endpoint with a random session id.
    pub fn new(origin: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self::with_session_id(origin, session_id(), access_key)
    }

    /// Create an endpoint with an explicit session id.
    pub fn with_session_id(
        origin: impl Into<String>,
        session_id: u32,
        access_key: impl Into<String>,
    ) -> Self {
        let origin = origin.into();
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            session_id,
            access_key: access_key.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// `/{sessionId}/0?key={accessKey}`, with the key percent-encoded.
    pub fn path(&self) -> String {
        format!(
            "/{}/{}?key={}",
            self.session_id,
            SESSION_SUBPATH,
            percent_encode(&self.access_key)
        )
    }

    /// `{origin}/{sessionId}/0?key={accessKey}`.
    pub fn url(&self) -> String {
        format!("{}{}", self.origin, self.path())
    }

    /// Parse the path form produced by [`Endpoint::path`].
    ///
    /// Query parameters other than `key` are ignored.
    pub fn parse_path(path: &str) -> Result<SessionPath> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let (route, query) = path.split_once('?').unwrap_or((path, ""));
        let mut segments = route
            .strip_prefix('/')
            .ok_or_else(|| invalid("path must start with '/'"))?
            .split('/');

        let session_id = segments
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| invalid("session id is not an unsigned 32-bit integer"))?;
        if segments.next() != Some(SESSION_SUBPATH) || segments.next().is_some() {
            return Err(invalid("expected '/{sessionId}/0'"));
        }

        let raw_key = query
            .split('&')
            .find_map(|pair| pair.strip_prefix("key="))
            .ok_or_else(|| invalid("missing key parameter"))?;
        let access_key = percent_decode(raw_key).ok_or_else(|| invalid("bad key encoding"))?;

        Ok(SessionPath {
            session_id,
            access_key,
        })
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("origin", &self.origin)
            .field("session_id", &self.session_id)
            .field(
                "access_key",
                &format_args!("<redacted:{} bytes>", self.access_key.len()),
            )
            .finish()
    }
}

impl fmt::Debug for SessionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPath")
            .field("session_id", &self.session_id)
            .field(
                "access_key",
                &format_args!("<redacted:{} bytes>", self.access_key.len()),
            )
            .finish()
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
