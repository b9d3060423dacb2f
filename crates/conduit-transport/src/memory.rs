//! In-process sockets.
//!
//! Used to wire a client and a responder together without a network, and to
//! inject transport failures in tests.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::Sink;
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::Connection;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::socket::{BoxSocket, Dialer};

/// One end of an in-process socket pair.
#[derive(Debug)]
pub struct MemorySocket {
    tx: mpsc::UnboundedSender<Result<Bytes>>,
    rx: mpsc::UnboundedReceiver<Result<Bytes>>,
}

/// Create two connected sockets.
pub fn pair() -> (MemorySocket, MemorySocket) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        MemorySocket { tx: a_tx, rx: a_rx },
        MemorySocket { tx: b_tx, rx: b_rx },
    )
}

impl MemorySocket {
    /// A handle that delivers transport errors to the other end of this socket.
    pub fn injector(&self) -> FaultInjector {
        FaultInjector {
            tx: self.tx.clone(),
        }
    }
}

impl Stream for MemorySocket {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Sink<Bytes> for MemorySocket {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        if self.tx.is_closed() {
            return Poll::Ready(Err(TransportError::Closed));
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<()> {
        self.tx.send(Ok(item)).map_err(|_| TransportError::Closed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Delivers transport errors into the inbound side of a [`MemorySocket`].
#[derive(Debug, Clone)]
pub struct FaultInjector {
    tx: mpsc::UnboundedSender<Result<Bytes>>,
}

impl FaultInjector {
    /// Deliver `err` as if the transport had failed. Returns false if the
    /// receiving end is gone.
    pub fn inject(&self, err: TransportError) -> bool {
        self.tx.send(Err(err)).is_ok()
    }

    /// Deliver raw bytes, bypassing the frame codec.
    pub fn inject_raw(&self, frame: Bytes) -> bool {
        self.tx.send(Ok(frame)).is_ok()
    }
}

/// Create a dialer and the listener that accepts what it dials.
pub fn listener() -> (MemoryDialer, MemoryListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryDialer { tx }, MemoryListener { rx })
}

/// Dials [`MemoryListener`]s.
#[derive(Debug, Clone)]
pub struct MemoryDialer {
    tx: mpsc::UnboundedSender<(Endpoint, MemorySocket)>,
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<BoxSocket> {
        let (local, remote) = pair();
        self.tx
            .send((endpoint.clone(), remote))
            .map_err(|_| TransportError::Connect {
                url: endpoint.url(),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "memory listener is gone",
                ),
            })?;
        debug!(session_id = endpoint.session_id(), "dialed memory socket");
        Ok(Box::new(local))
    }
}

/// Accepts sockets opened by a [`MemoryDialer`].
#[derive(Debug)]
pub struct MemoryListener {
    rx: mpsc::UnboundedReceiver<(Endpoint, MemorySocket)>,
}

impl MemoryListener {
    /// Wait for the next dialed socket.
    pub async fn accept(&mut self) -> Result<(Endpoint, MemorySocket)> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    /// Wait for the next dialed socket and wrap it in a [`Connection`].
    pub async fn accept_connection(&mut self) -> Result<Connection> {
        let (endpoint, socket) = self.accept().await?;
        Ok(Connection::from_socket(endpoint, Box::new(socket)))
    }
}
