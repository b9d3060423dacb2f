//! Message-oriented connections carrying conduit frames.
//!
//! A [`Connection`] wraps one bidirectional transport:
//! - [`Connection::send`] encodes a frame and queues it, no ack
//! - [`Connection::receive`] registers a callback for every inbound message
//!   and error, and returns a [`Subscription`] that deregisters it
//!
//! Transports plug in through the [`Dialer`] and [`Socket`] traits. This
//! crate ships an in-process transport ([`memory`]) and a byte-stream
//! transport over TCP and Unix domain sockets ([`stream`]).

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod memory;
mod registry;
pub mod socket;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use connection::{
    connect, connect_async, ConnectConfig, Connection, ConnectionState, WeakConnection,
    DEFAULT_CONNECT_TIMEOUT,
};
pub use endpoint::{Endpoint, SessionPath};
pub use error::{Result, TransportError};
pub use registry::{ReceiveResult, SharedError, Subscription};
pub use socket::{BoxSocket, Dialer, FramedSocket, Socket};
pub use stream::{ListenerConfig, Origin, StreamDialer, StreamListener, DEFAULT_HELLO_TIMEOUT};
