//! The calling side: issue requests and settle them by token.
//!
//! # Lifecycle of a call
//!
//! ```text
//! request()
//!   1. register: fresh token -> pending map (guarded)
//!   2. send {route, token, ..options} + payload
//!   3. await the oneshot receiver
//!
//! inbound frame (connection callback)
//!   4. parse payload as JSON, else ignore
//!   5. token = record.token or options.token
//!   6. remove token from pending map, settle through its sender
//!
//! terminal transport error
//!   6'. drain pending map, reject every call, refuse new ones
//! ```
//!
//! The guard removes the entry on timeout or when the request future is
//! dropped, so every entry leaves the map exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use conduit_frame::{Message, Options};
use conduit_transport::{
    Connection, ConnectionState, ReceiveResult, SharedError, Subscription, TransportError,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Result, RpcError};
use crate::record::ResponseRecord;
use crate::{token, ROUTE_OPTION, TOKEN_OPTION};

/// Default time a request waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

type Settlement = Result<Value>;

struct PendingCall {
    id: u64,
    settle: oneshot::Sender<Settlement>,
}

#[derive(Default)]
struct PendingState {
    calls: HashMap<String, PendingCall>,
    /// Set once the connection has failed; new calls are refused with it.
    failed: Option<SharedError>,
}

#[derive(Default)]
struct PendingCalls {
    next_id: AtomicU64,
    state: Mutex<PendingState>,
}

impl PendingCalls {
    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(self: &Arc<Self>) -> Result<(PendingGuard, oneshot::Receiver<Settlement>)> {
        let mut state = self.lock();
        if let Some(err) = &state.failed {
            return Err(RpcError::Transport(Arc::clone(err)));
        }

        let mut token = token::generate();
        while state.calls.contains_key(&token) {
            token = token::generate();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        state.calls.insert(token.clone(), PendingCall { id, settle: tx });

        Ok((
            PendingGuard {
                calls: Arc::clone(self),
                token,
                id,
            },
            rx,
        ))
    }

    fn on_event(&self, event: ReceiveResult<'_>) {
        match event {
            Ok(message) => self.on_message(message),
            Err(err) if !err.is_terminal() => {
                // Cannot be attributed to any call.
                debug!(error = %err, "ignoring undecodable frame");
            }
            Err(err) => self.fail_all(err),
        }
    }

    fn on_message(&self, message: &Message) {
        let Some(record) = ResponseRecord::parse(&message.payload) else {
            trace!(payload_len = message.payload.len(), "ignoring non-JSON payload");
            return;
        };
        // Either token may identify the call: the record's first, then the
        // frame's own option.
        let candidates = [record.token(), message.option(TOKEN_OPTION)];
        if candidates.iter().all(Option::is_none) {
            trace!("ignoring response without token");
            return;
        }

        let settled = {
            let mut state = self.lock();
            let found = candidates
                .into_iter()
                .flatten()
                .find_map(|token| state.calls.remove_entry(token));
            found
        };
        let Some((token, call)) = settled else {
            debug!(?candidates, "no pending call for token");
            return;
        };
        trace!(%token, "settling call");
        let _ = call.settle.send(record.settle());
    }

    fn fail_all(&self, err: SharedError) {
        let drained: Vec<(String, PendingCall)> = {
            let mut state = self.lock();
            if state.failed.is_none() {
                state.failed = Some(Arc::clone(&err));
            }
            state.calls.drain().collect()
        };

        if !drained.is_empty() {
            warn!(error = %err, pending = drained.len(), "rejecting pending calls");
        }
        for (_, call) in drained {
            let _ = call.settle.send(Err(RpcError::Transport(Arc::clone(&err))));
        }
    }

    fn len(&self) -> usize {
        self.lock().calls.len()
    }
}

/// Owns one pending-map entry; removes it on drop unless it was settled first.
struct PendingGuard {
    calls: Arc<PendingCalls>,
    token: String,
    id: u64,
}

impl PendingGuard {
    fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut state = self.calls.lock();
        // The token may have been settled and handed to a newer call since.
        if state.calls.get(&self.token).is_some_and(|call| call.id == self.id) {
            state.calls.remove(&self.token);
            trace!(token = %self.token, "pending call released");
        }
    }
}

/// Issues requests over one [`Connection`] and matches responses by token.
///
/// Requests may be issued concurrently; responses may arrive in any order.
pub struct Client {
    connection: Connection,
    pending: Arc<PendingCalls>,
    config: ClientConfig,
    _subscription: Subscription,
}

impl Client {
    pub fn new(connection: Connection) -> Self {
        Self::with_config(connection, ClientConfig::default())
    }

    pub fn with_config(connection: Connection, config: ClientConfig) -> Self {
        let pending = Arc::new(PendingCalls::default());
        let listener = Arc::clone(&pending);
        let subscription = connection.receive(move |event| listener.on_event(event));

        // A connection that closed before we subscribed never reports it to us.
        if connection.state() == ConnectionState::Closed {
            pending.fail_all(Arc::new(TransportError::Closed));
        }

        Self {
            connection,
            pending,
            config,
            _subscription: subscription,
        }
    }

    /// Send `command` and wait for the matching response, using the
    /// configured timeout.
    ///
    /// Resolves with the response's `data` (or the whole record when it has
    /// none). Rejects with [`RpcError::Application`] if the response carries
    /// an `err`, and with [`RpcError::Transport`] if the connection fails
    /// first.
    ///
    /// The frame's options are `route`, `token`, then `options` in order.
    /// `route` and `token` belong to the client: an `options` entry with
    /// either name is not allowed to override them and fails the call with
    /// [`RpcError::ReservedOption`] before anything is sent.
    pub async fn request(&self, command: &str, options: &Options, payload: &[u8]) -> Result<Value> {
        self.request_with_timeout(command, options, payload, self.config.request_timeout)
            .await
    }

    /// [`Client::request`] with an explicit timeout. `None` waits forever.
    pub async fn request_with_timeout(
        &self,
        command: &str,
        options: &Options,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Value> {
        for reserved in [ROUTE_OPTION, TOKEN_OPTION] {
            if options.contains_key(reserved) {
                return Err(RpcError::ReservedOption(reserved.to_string()));
            }
        }

        let (guard, settled) = self.pending.register()?;

        let mut frame_options = Options::with_capacity(options.len() + 2);
        frame_options.push(ROUTE_OPTION, command);
        frame_options.push(TOKEN_OPTION, guard.token());
        for (key, value) in options {
            frame_options.push(key, value);
        }

        debug!(command, token = guard.token(), "sending request");
        self.connection.send(&frame_options, payload)?;

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, settled).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(command, token = guard.token(), ?limit, "request timed out");
                    return Err(RpcError::Timeout(limit));
                }
            },
            None => settled.await,
        };

        outcome.unwrap_or_else(|_| Err(RpcError::Transport(Arc::new(TransportError::Closed))))
    }

    /// Calls sent and not yet settled.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connection", &self.connection)
            .field("pending", &self.pending_count())
            .field("config", &self.config)
            .finish()
    }
}
