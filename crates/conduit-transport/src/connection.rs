//! One bidirectional connection carrying frames.
//!
//! A [`Connection`] is a cheap handle. The socket itself is owned by a driver:
//! one task writes queued frames, another decodes inbound frames and hands
//! them to every registered listener. Dropping the last handle stops both.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use conduit_frame::{decode_message, encode_message, Options};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::registry::{ReceiveResult, Registry, SharedError, Subscription};
use crate::socket::{BoxSocket, Dialer};

/// Default time allowed for the transport to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The transport is being opened; sends are queued.
    Connecting,
    Open,
    /// Closed locally or after a terminal transport error. Final.
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// Where to connect and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// `scheme://address` the endpoint URL is built on.
    pub origin: String,
    pub access_key: String,
    pub connect_timeout: Duration,
}

impl ConnectConfig {
    pub fn new(origin: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            access_key: access_key.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

struct Shared {
    endpoint: Endpoint,
    outbound: mpsc::UnboundedSender<Bytes>,
    registry: Arc<Registry>,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Handle to one connection. Clones share the same transport.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

/// Start connecting and return at once.
///
/// `on_ready` is called exactly once: with `Ok(())` when the transport is
/// open, or with the error that kept it from opening. Frames sent before
/// that are queued and written once the transport opens.
///
/// Must be called inside a tokio runtime.
pub fn connect<D, F>(dialer: D, config: ConnectConfig, on_ready: F) -> Connection
where
    D: Dialer,
    F: FnOnce(std::result::Result<(), SharedError>) + Send + 'static,
{
    let endpoint = Endpoint::new(config.origin, config.access_key);
    let (connection, driver) = Connection::with_state(endpoint.clone(), ConnectionState::Connecting);
    let timeout = config.connect_timeout;

    tokio::spawn(async move {
        debug!(session_id = endpoint.session_id(), origin = endpoint.origin(), "dialing");
        let dialed = tokio::select! {
            _ = driver.shutdown.cancelled() => Err(TransportError::Closed),
            dialed = tokio::time::timeout(timeout, dialer.dial(&endpoint)) => {
                dialed.unwrap_or(Err(TransportError::Timeout(timeout)))
            }
        };

        match dialed {
            Ok(socket) => {
                let opened = driver
                    .state
                    .compare_exchange(
                        ConnectionState::Connecting as u8,
                        ConnectionState::Open as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();
                if !opened {
                    on_ready(Err(Arc::new(TransportError::Closed)));
                    driver.terminate(Arc::new(TransportError::Closed));
                    return;
                }
                info!(session_id = endpoint.session_id(), "connection open");
                on_ready(Ok(()));
                driver.run(socket).await;
            }
            Err(err) => {
                warn!(session_id = endpoint.session_id(), error = %err, "connect failed");
                let err = Arc::new(err);
                on_ready(Err(Arc::clone(&err)));
                driver.terminate(err);
            }
        }
    });

    connection
}

/// Connect and wait until the transport is open.
pub async fn connect_async<D: Dialer>(
    dialer: D,
    config: ConnectConfig,
) -> std::result::Result<Connection, SharedError> {
    let (tx, rx) = oneshot::channel();
    let connection = connect(dialer, config, move |ready| {
        let _ = tx.send(ready);
    });
    match rx.await {
        Ok(Ok(())) => Ok(connection),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(Arc::new(TransportError::Closed)),
    }
}

impl Connection {
    /// Wrap a socket that is already open.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_socket(endpoint: Endpoint, socket: BoxSocket) -> Self {
        let (connection, driver) = Self::with_state(endpoint, ConnectionState::Open);
        tokio::spawn(driver.run(socket));
        connection
    }

    fn with_state(endpoint: Endpoint, state: ConnectionState) -> (Self, Driver) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Registry::default());
        let state = Arc::new(AtomicU8::new(state as u8));
        let shutdown = CancellationToken::new();

        let driver = Driver {
            session_id: endpoint.session_id(),
            outbound: Some(outbound_rx),
            registry: Arc::clone(&registry),
            state: Arc::clone(&state),
            shutdown: shutdown.clone(),
        };
        let shared = Arc::new(Shared {
            endpoint,
            outbound: outbound_tx,
            registry,
            state,
            shutdown,
        });
        (Self { shared }, driver)
    }

    /// Encode one frame and queue it for the transport. No acknowledgement
    /// is awaited.
    ///
    /// Encoding failures are returned here and nothing is sent.
    pub fn send(&self, options: &Options, payload: &[u8]) -> Result<()> {
        let frame = encode_message(options, payload)?;
        if self.state() == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }
        self.shared
            .outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    /// Register a callback for every inbound message and error.
    ///
    /// A frame that fails to decode is reported as a non-terminal
    /// [`TransportError::Frame`] and the registration stays in place. A
    /// terminal error is reported once, after which the connection is closed.
    pub fn receive<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(ReceiveResult<'_>) + Send + 'static,
    {
        self.shared.registry.register(Box::new(callback))
    }

    /// Tear the connection down. Listeners see [`TransportError::Closed`].
    pub fn close(&self) {
        self.shared.shutdown.cancel();
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.shared.shutdown.cancelled().await;
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn session_id(&self) -> u32 {
        self.shared.endpoint.session_id()
    }

    pub fn url(&self) -> String {
        self.shared.endpoint.url()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Number of live receive registrations.
    pub fn listener_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// A handle that does not keep the connection alive.
    ///
    /// Callbacks registered with [`Connection::receive`] that need to send
    /// should hold one of these; a strong handle would keep the connection
    /// open for as long as the callback is registered.
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

/// Non-owning handle to a [`Connection`].
#[derive(Clone)]
pub struct WeakConnection {
    shared: Weak<Shared>,
}

impl WeakConnection {
    pub fn upgrade(&self) -> Option<Connection> {
        self.shared.upgrade().map(|shared| Connection { shared })
    }
}

impl std::fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakConnection")
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

struct Driver {
    session_id: u32,
    outbound: Option<mpsc::UnboundedReceiver<Bytes>>,
    registry: Arc<Registry>,
    state: Arc<AtomicU8>,
    shutdown: CancellationToken,
}

impl Driver {
    /// Reads until the connection ends. Writes happen on their own task so a
    /// peer that is slow to read never stalls inbound dispatch.
    async fn run(mut self, socket: BoxSocket) {
        let (sink, mut stream) = socket.split();
        let Some(outbound) = self.outbound.take() else {
            self.terminate(Arc::new(TransportError::Closed));
            return;
        };
        let mut writer = tokio::spawn(write_frames(sink, outbound, self.shutdown.clone()));

        let reason = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break TransportError::Closed,
                written = &mut writer => break match written {
                    Ok(reason) => reason,
                    Err(err) => TransportError::Io(std::io::Error::other(err)),
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => self.deliver(frame),
                    Some(Err(err)) if !err.is_terminal() => {
                        warn!(session_id = self.session_id, error = %err, "dropping bad inbound frame");
                        self.registry.dispatch(Err(Arc::new(err)));
                    }
                    Some(Err(err)) => break err,
                    None => break TransportError::Closed,
                },
            }
        };

        self.terminate(Arc::new(reason));
    }

    fn deliver(&self, frame: Bytes) {
        match decode_message(frame) {
            Ok(message) => {
                debug!(
                    session_id = self.session_id,
                    options = message.options.len(),
                    payload_len = message.payload.len(),
                    "frame received"
                );
                self.registry.dispatch(Ok(&message));
            }
            Err(err) => {
                warn!(session_id = self.session_id, error = %err, "dropping undecodable frame");
                self.registry
                    .dispatch(Err(Arc::new(TransportError::Frame(err))));
            }
        }
    }

    fn terminate(self, reason: SharedError) {
        // Refuse further sends before anyone hears about the close.
        drop(self.outbound);
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        self.shutdown.cancel();

        match reason.as_ref() {
            TransportError::Closed => info!(session_id = self.session_id, "connection closed"),
            err => warn!(session_id = self.session_id, error = %err, "connection failed"),
        }
        self.registry.dispatch(Err(reason));
    }
}

/// Drains queued frames into the sink until shutdown or a write fails.
async fn write_frames(
    mut sink: SplitSink<BoxSocket, Bytes>,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
    shutdown: CancellationToken,
) -> TransportError {
    let pump = async {
        while let Some(frame) = outbound.recv().await {
            sink.send(frame).await?;
        }
        Ok::<(), TransportError>(())
    };

    let reason = tokio::select! {
        _ = shutdown.cancelled() => TransportError::Closed,
        pumped = pump => match pumped {
            Ok(()) => TransportError::Closed,
            Err(err) => err,
        },
    };
    if matches!(reason, TransportError::Closed) {
        let _ = sink.close().await;
    }
    reason
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use conduit_frame::Message;

    use super::*;
    use crate::memory;

    type Event = std::result::Result<Message, SharedError>;

    fn recorder(connection: &Connection) -> (Subscription, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = connection.receive(move |event| {
            let _ = tx.send(event.cloned());
        });
        (subscription, rx)
    }

    fn endpoint(session_id: u32) -> Endpoint {
        Endpoint::with_session_id("memory://test", session_id, "k")
    }

    fn connected_pair() -> (Connection, Connection, memory::FaultInjector) {
        let (a, b) = memory::pair();
        let injector = b.injector();
        (
            Connection::from_socket(endpoint(1), Box::new(a)),
            Connection::from_socket(endpoint(1), Box::new(b)),
            injector,
        )
    }

    #[tokio::test]
    async fn send_and_receive() {
        let (client, server, _) = connected_pair();
        let (_sub, mut events) = recorder(&server);

        client
            .send(&Options::new().with("route", "ping"), &[1, 2])
            .unwrap();

        let message = events.recv().await.unwrap().unwrap();
        assert_eq!(message.option("route"), Some("ping"));
        assert_eq!(message.payload.as_ref(), &[1, 2]);
    }

    #[tokio::test]
    async fn encode_failure_sends_nothing() {
        let (client, _server, _) = connected_pair();
        let key = "k".repeat(256);

        let err = client.send(&Options::new().with(key, "v"), &[]).unwrap_err();
        assert!(matches!(err, TransportError::Frame(ref e) if e.is_encoding()));
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn sends_before_open_are_queued() {
        let (dialer, mut listener) = memory::listener();
        let ready = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ready);

        let client = connect(dialer, ConnectConfig::new("memory://test", "k"), move |r| {
            seen.lock().unwrap().push(r.is_ok());
        });
        assert_eq!(client.state(), ConnectionState::Connecting);
        client.send(&Options::new().with("n", "1"), b"early").unwrap();

        let server = listener.accept_connection().await.unwrap();
        assert_eq!(server.session_id(), client.session_id());
        let (_sub, mut events) = recorder(&server);

        let message = events.recv().await.unwrap().unwrap();
        assert_eq!(message.payload.as_ref(), b"early");
        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(*ready.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn failed_dial_reports_once_and_closes() {
        let (dialer, listener) = memory::listener();
        drop(listener);

        let err = connect_async(dialer, ConnectConfig::new("memory://test", "k"))
            .await
            .unwrap_err();
        assert!(matches!(*err, TransportError::Connect { .. }));
    }

    struct Stalled;

    #[async_trait]
    impl Dialer for Stalled {
        async fn dial(&self, _endpoint: &Endpoint) -> Result<BoxSocket> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn connect_times_out() {
        let config =
            ConnectConfig::new("memory://test", "k").with_connect_timeout(Duration::from_millis(20));
        let err = connect_async(Stalled, config).await.unwrap_err();
        assert!(matches!(*err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn close_while_connecting_reports_closed() {
        let (tx, rx) = oneshot::channel();
        let connection = connect(Stalled, ConnectConfig::new("memory://test", "k"), move |r| {
            let _ = tx.send(r);
        });
        connection.close();

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(*err, TransportError::Closed));
        connection.closed().await;
        assert_eq!(connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn undecodable_frame_is_reported_and_listening_continues() {
        let (client, server, injector) = connected_pair();
        let (_sub, mut events) = recorder(&client);

        assert!(injector.inject_raw(Bytes::from_static(&[0x01])));
        let err = events.recv().await.unwrap().unwrap_err();
        assert!(!err.is_terminal());

        server.send(&Options::new(), b"after").unwrap();
        let message = events.recv().await.unwrap().unwrap();
        assert_eq!(message.payload.as_ref(), b"after");
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn terminal_error_reaches_every_listener_and_closes() {
        let (client, _server, injector) = connected_pair();
        let (_a, mut events_a) = recorder(&client);
        let (_b, mut events_b) = recorder(&client);

        injector.inject(TransportError::Io(std::io::Error::other("reset")));

        for events in [&mut events_a, &mut events_b] {
            let err = events.recv().await.unwrap().unwrap_err();
            assert!(matches!(*err, TransportError::Io(_)));
        }
        client.closed().await;
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(
            client.send(&Options::new(), &[]),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_notifies_listeners_and_peer() {
        let (client, server, _) = connected_pair();
        let (_local, mut local_events) = recorder(&client);
        let (_remote, mut remote_events) = recorder(&server);

        client.close();

        let err = local_events.recv().await.unwrap().unwrap_err();
        assert!(matches!(*err, TransportError::Closed));
        let err = remote_events.recv().await.unwrap().unwrap_err();
        assert!(matches!(*err, TransportError::Closed));
        server.closed().await;
    }

    #[tokio::test]
    async fn disposed_listener_sees_nothing_more() {
        let (client, server, _) = connected_pair();
        let (subscription, mut disposed) = recorder(&client);
        let (_kept, mut kept) = recorder(&client);

        subscription.dispose();
        subscription.dispose();
        assert_eq!(client.listener_count(), 1);

        server.send(&Options::new(), b"x").unwrap();
        assert!(kept.recv().await.unwrap().is_ok());
        drop(subscription);
        assert!(disposed.recv().await.is_none());
    }

    #[tokio::test]
    async fn weak_handle_does_not_keep_connection_alive() {
        let (client, _server, _) = connected_pair();
        let weak = client.downgrade();
        assert!(weak.upgrade().is_some());

        drop(client);
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn dropping_every_handle_closes_the_peer() {
        let (client, server, _) = connected_pair();
        let (_sub, mut events) = recorder(&server);

        drop(client);

        let err = events.recv().await.unwrap().unwrap_err();
        assert!(matches!(*err, TransportError::Closed));
    }
}
