//! Connections over byte streams: TCP, and Unix domain sockets on Unix.
//!
//! Frames travel inside stream envelopes. The first envelope a client writes
//! is the hello: the endpoint path `/{sessionId}/0?key={accessKey}`. The
//! listener reads it, checks the key, and only then hands the connection out.

use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use conduit_frame::{EnvelopeCodec, EnvelopeConfig};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::socket::{BoxSocket, Dialer, FramedSocket};
#[cfg(unix)]
use crate::uds::UnixSocketListener;

/// Default time a listener waits for the hello envelope.
pub const DEFAULT_HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// A parsed stream origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// `tcp://host:port`
    Tcp(String),
    /// `unix:///absolute/or/relative/path`
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Origin {
    pub fn parse(origin: &str) -> Result<Self> {
        let invalid = |reason: &str| TransportError::InvalidOrigin {
            origin: origin.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = origin
            .split_once("://")
            .ok_or_else(|| invalid("expected scheme://address"))?;
        match scheme {
            "tcp" => {
                let addr = rest.trim_end_matches('/');
                if addr.is_empty() || !addr.contains(':') {
                    return Err(invalid("expected tcp://host:port"));
                }
                Ok(Self::Tcp(addr.to_string()))
            }
            #[cfg(unix)]
            "unix" => {
                if rest.is_empty() {
                    return Err(invalid("expected unix://path"));
                }
                Ok(Self::Unix(PathBuf::from(rest)))
            }
            other => Err(invalid(&format!("unsupported scheme '{other}'"))),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Dials `tcp://` and `unix://` origins.
#[derive(Debug, Clone, Default)]
pub struct StreamDialer {
    envelope: EnvelopeConfig,
}

impl StreamDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_envelope_config(envelope: EnvelopeConfig) -> Self {
        Self { envelope }
    }

    async fn hello<S>(&self, io: S, endpoint: &Endpoint) -> Result<BoxSocket>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut socket = FramedSocket::new(io, EnvelopeCodec::with_config(self.envelope.clone()));
        socket.send(Bytes::from(endpoint.path())).await?;
        Ok(Box::new(socket))
    }
}

#[async_trait]
impl Dialer for StreamDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<BoxSocket> {
        let connect_err = |source| TransportError::Connect {
            url: endpoint.origin().to_string(),
            source,
        };

        match Origin::parse(endpoint.origin())? {
            Origin::Tcp(addr) => {
                let stream = TcpStream::connect(&addr).await.map_err(connect_err)?;
                stream.set_nodelay(true).map_err(connect_err)?;
                debug!(%addr, session_id = endpoint.session_id(), "connected over tcp");
                self.hello(stream, endpoint).await
            }
            #[cfg(unix)]
            Origin::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(&path)
                    .await
                    .map_err(connect_err)?;
                debug!(?path, session_id = endpoint.session_id(), "connected over unix socket");
                self.hello(stream, endpoint).await
            }
        }
    }
}

/// Settings for [`StreamListener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Key clients must present. `None` accepts any key.
    pub access_key: Option<String>,
    pub hello_timeout: Duration,
    /// File mode for Unix socket paths.
    pub socket_mode: u32,
    pub envelope: EnvelopeConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            access_key: None,
            hello_timeout: DEFAULT_HELLO_TIMEOUT,
            socket_mode: 0o600,
            envelope: EnvelopeConfig::default(),
        }
    }
}

impl ListenerConfig {
    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }
}

enum Bound {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixSocketListener),
}

/// Accepts stream connections.
pub struct StreamListener {
    bound: Bound,
    origin: String,
    config: ListenerConfig,
}

impl StreamListener {
    /// Bind to `origin`. A `tcp://` origin with port 0 picks a free port;
    /// see [`StreamListener::local_origin`].
    pub async fn bind(origin: &str, config: ListenerConfig) -> Result<Self> {
        let (bound, origin) = match Origin::parse(origin)? {
            Origin::Tcp(addr) => {
                let listener =
                    TcpListener::bind(&addr)
                        .await
                        .map_err(|source| TransportError::Bind {
                            origin: origin.to_string(),
                            source,
                        })?;
                let local = listener.local_addr().map_err(|source| TransportError::Bind {
                    origin: origin.to_string(),
                    source,
                })?;
                info!(%local, "listening on tcp");
                (Bound::Tcp(listener), format!("tcp://{local}"))
            }
            #[cfg(unix)]
            Origin::Unix(path) => {
                let listener = UnixSocketListener::bind_with_mode(&path, config.socket_mode)?;
                (Bound::Unix(listener), format!("unix://{}", path.display()))
            }
        };

        Ok(Self {
            bound,
            origin,
            config,
        })
    }

    /// The origin clients should dial.
    pub fn local_origin(&self) -> &str {
        &self.origin
    }

    /// Wait for a client, read its hello and return the server side of the
    /// connection.
    ///
    /// A client whose hello is missing, late, malformed or carries the wrong
    /// key is dropped and reported as [`TransportError::Handshake`] or
    /// [`TransportError::Timeout`]; the listener stays usable.
    pub async fn accept(&self) -> Result<Connection> {
        match &self.bound {
            Bound::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                stream.set_nodelay(true)?;
                debug!(%peer, "accepted tcp connection");
                self.handshake(stream).await
            }
            #[cfg(unix)]
            Bound::Unix(listener) => {
                let stream = listener.accept().await?;
                self.handshake(stream).await
            }
        }
    }

    async fn handshake<S>(&self, io: S) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut socket =
            FramedSocket::new(io, EnvelopeCodec::with_config(self.config.envelope.clone()));

        let hello = tokio::time::timeout(self.config.hello_timeout, socket.next())
            .await
            .map_err(|_| {
                warn!(timeout = ?self.config.hello_timeout, "no hello from client");
                TransportError::Timeout(self.config.hello_timeout)
            })?
            .ok_or_else(|| TransportError::Handshake("closed before hello".into()))??;

        let path = std::str::from_utf8(&hello)
            .map_err(|_| TransportError::Handshake("hello is not UTF-8".into()))?;
        let session = Endpoint::parse_path(path)
            .map_err(|err| TransportError::Handshake(err.to_string()))?;

        if let Some(expected) = &self.config.access_key {
            if *expected != session.access_key {
                warn!(session_id = session.session_id, "rejected client with wrong access key");
                return Err(TransportError::Handshake("access key rejected".into()));
            }
        }

        info!(session_id = session.session_id, "client connected");
        let endpoint =
            Endpoint::with_session_id(self.origin.clone(), session.session_id, session.access_key);
        Ok(Connection::from_socket(endpoint, Box::new(socket)))
    }
}

impl fmt::Debug for StreamListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamListener")
            .field("origin", &self.origin)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tcp_origin() {
        assert_eq!(
            Origin::parse("tcp://127.0.0.1:7300").unwrap(),
            Origin::Tcp("127.0.0.1:7300".into())
        );
        assert_eq!(
            Origin::parse("tcp://localhost:1/").unwrap().to_string(),
            "tcp://localhost:1"
        );
    }

    #[cfg(unix)]
    #[test]
    fn parse_unix_origin() {
        assert_eq!(
            Origin::parse("unix:///tmp/conduit.sock").unwrap(),
            Origin::Unix(PathBuf::from("/tmp/conduit.sock"))
        );
    }

    #[test]
    fn parse_rejects_bad_origins() {
        for origin in ["127.0.0.1:1", "ws://h:1", "tcp://", "tcp://nohost", "unix://"] {
            assert!(
                matches!(
                    Origin::parse(origin),
                    Err(TransportError::InvalidOrigin { .. })
                ),
                "{origin}"
            );
        }
    }

    #[tokio::test]
    async fn listener_reports_bound_port() {
        let listener = StreamListener::bind("tcp://127.0.0.1:0", ListenerConfig::default())
            .await
            .unwrap();
        assert!(listener.local_origin().starts_with("tcp://127.0.0.1:"));
        assert!(!listener.local_origin().ends_with(":0"));
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let config = ListenerConfig {
            hello_timeout: Duration::from_millis(20),
            ..ListenerConfig::default()
        };
        let listener = StreamListener::bind("tcp://127.0.0.1:0", config)
            .await
            .unwrap();
        let addr = listener.local_origin().trim_start_matches("tcp://").to_string();

        let _client = TcpStream::connect(addr).await.unwrap();
        let err = listener.accept().await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }
}
