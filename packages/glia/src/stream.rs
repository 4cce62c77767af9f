//! The stream capability.
//!
//! A dispatcher serves anything that is a bidirectional byte stream carrying
//! routing metadata and supporting half-close in both directions. Overlay
//! streams, TCP connections and HTTP exchanges are all adapted to [`Stream`].

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::protocol::{Address, Mode, ProtocolError};

/// A request stream addressed to one process.
#[async_trait]
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {
    /// Target process, in string form.
    fn proc(&self) -> &str;

    /// Method named by the stream's address, if any.
    fn method(&self) -> Option<&str>;

    /// Whether the caller expects a result.
    fn mode(&self) -> Mode {
        Mode::Call
    }

    /// Stop reading. Later reads see end of stream.
    async fn close_read(&mut self) -> io::Result<()>;

    /// Stop writing. The peer sees end of stream once buffered bytes drain.
    async fn close_write(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}

#[async_trait]
impl<T: Stream + ?Sized> Stream for &mut T {
    fn proc(&self) -> &str {
        (**self).proc()
    }

    fn method(&self) -> Option<&str> {
        (**self).method()
    }

    fn mode(&self) -> Mode {
        (**self).mode()
    }

    async fn close_read(&mut self) -> io::Result<()> {
        (**self).close_read().await
    }

    async fn close_write(&mut self) -> io::Result<()> {
        (**self).close_write().await
    }
}

#[async_trait]
impl<T: Stream + ?Sized> Stream for Box<T> {
    fn proc(&self) -> &str {
        (**self).proc()
    }

    fn method(&self) -> Option<&str> {
        (**self).method()
    }

    fn mode(&self) -> Mode {
        (**self).mode()
    }

    async fn close_read(&mut self) -> io::Result<()> {
        (**self).close_read().await
    }

    async fn close_write(&mut self) -> io::Result<()> {
        (**self).close_write().await
    }
}

/// A transport stream opened under an overlay protocol id.
///
/// Wraps any async byte stream; the address comes from the protocol id the
/// stream was negotiated with. Closing the read side is local: further reads
/// return end of stream without touching the transport.
#[derive(Debug)]
pub struct OverlayStream<S> {
    io: S,
    address: Address,
    read_closed: bool,
}

impl<S> OverlayStream<S> {
    /// Wrap `io` negotiated under `protocol`.
    pub fn new(protocol: &str, io: S) -> Result<Self, ProtocolError> {
        Ok(Self::from_address(Address::parse(protocol)?, io))
    }

    /// Wrap `io` with an already parsed address.
    pub fn from_address(address: Address, io: S) -> Self {
        Self {
            io,
            address,
            read_closed: false,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn into_inner(self) -> S {
        self.io
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for OverlayStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.read_closed {
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.io).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for OverlayStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().io).poll_shutdown(cx)
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Send + Unpin> Stream for OverlayStream<S> {
    fn proc(&self) -> &str {
        &self.address.proc
    }

    fn method(&self) -> Option<&str> {
        self.address.method.as_deref()
    }

    fn mode(&self) -> Mode {
        self.address.mode
    }

    async fn close_read(&mut self) -> io::Result<()> {
        self.read_closed = true;
        Ok(())
    }
}
