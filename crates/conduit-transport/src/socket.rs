use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use conduit_frame::EnvelopeCodec;
use futures_core::Stream;
use futures_util::Sink;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// A bidirectional, message-oriented transport.
///
/// Each stream item is one whole inbound frame; each sink item is one whole
/// outbound frame. The stream ending means the peer closed the transport.
///
/// Implemented for any type with the right `Stream` and `Sink` shape.
pub trait Socket:
    Stream<Item = Result<Bytes>> + Sink<Bytes, Error = TransportError> + Send + Unpin
{
}

impl<T> Socket for T where
    T: Stream<Item = Result<Bytes>> + Sink<Bytes, Error = TransportError> + Send + Unpin
{
}

/// A type-erased [`Socket`].
pub type BoxSocket = Box<dyn Socket>;

/// Opens sockets to endpoints.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    /// Open a socket to `endpoint`.
    ///
    /// Resolves once the transport is open and ready to carry frames.
    async fn dial(&self, endpoint: &Endpoint) -> Result<BoxSocket>;
}

#[async_trait]
impl<D: Dialer + ?Sized> Dialer for std::sync::Arc<D> {
    async fn dial(&self, endpoint: &Endpoint) -> Result<BoxSocket> {
        (**self).dial(endpoint).await
    }
}

/// A byte stream carrying frames inside stream envelopes.
pub struct FramedSocket<S> {
    inner: Framed<S, EnvelopeCodec>,
}

impl<S> FramedSocket<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(io: S, codec: EnvelopeCodec) -> Self {
        Self {
            inner: Framed::new(io, codec),
        }
    }

    pub fn from_framed(inner: Framed<S, EnvelopeCodec>) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> Framed<S, EnvelopeCodec> {
        self.inner
    }
}

impl<S> Stream for FramedSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|item| item.map(|frame| frame.map_err(TransportError::from)))
    }
}

impl<S> Sink<Bytes> for FramedSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::<Bytes>::poll_ready(Pin::new(&mut self.inner), cx).map_err(TransportError::from)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<()> {
        Pin::new(&mut self.inner)
            .start_send(item)
            .map_err(TransportError::from)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::<Bytes>::poll_flush(Pin::new(&mut self.inner), cx).map_err(TransportError::from)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::<Bytes>::poll_close(Pin::new(&mut self.inner), cx).map_err(TransportError::from)
    }
}
