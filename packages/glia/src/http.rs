//! HTTP binding.
//!
//! `POST /ww/0.1.0/{peer}/{proc}/{method}` with a protobuf [`CallData`]
//! body answers `200 OK` with a protobuf [`CallResult`] body. Call failures
//! are reported in the result's status like on any other stream; only
//! requests that cannot be answered at all map to HTTP errors.
//!
//! [`CallData`]: ww_wire::CallData
//! [`CallResult`]: ww_wire::CallResult

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::dispatch::{DispatchError, Dispatcher};
use crate::protocol::HTTP_ROUTE;
use crate::stream::Stream;

/// Media type of request and response bodies.
pub const CONTENT_TYPE: &str = "application/x-protobuf";

/// Build the router serving call requests.
pub fn router(dispatcher: Arc<Dispatcher>) -> axum::Router {
    axum::Router::new()
        .route(HTTP_ROUTE, post(handle))
        .with_state(dispatcher)
}

/// One HTTP exchange seen as a call stream.
///
/// Reads come from the request body; writes are buffered into the response.
pub struct HttpStream {
    peer: String,
    proc: String,
    method: String,
    body: Pin<Box<dyn AsyncRead + Send>>,
    read_closed: bool,
    response: Vec<u8>,
    write_closed: bool,
}

impl HttpStream {
    pub fn new(peer: String, proc: String, method: String, body: Body) -> Self {
        let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
        Self {
            peer,
            proc,
            method,
            body: Box::pin(reader),
            read_closed: false,
            response: Vec::new(),
            write_closed: false,
        }
    }

    /// Peer segment of the request path.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Everything written so far.
    pub fn into_response_body(self) -> Vec<u8> {
        self.response
    }
}

impl AsyncRead for HttpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.read_closed {
            return Poll::Ready(Ok(()));
        }
        this.body.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.write_closed {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        this.response.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().write_closed = true;
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl Stream for HttpStream {
    fn proc(&self) -> &str {
        &self.proc
    }

    fn method(&self) -> Option<&str> {
        Some(&self.method)
    }

    async fn close_read(&mut self) -> io::Result<()> {
        self.read_closed = true;
        Ok(())
    }
}

async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    Path((peer, proc, method)): Path<(String, String, String)>,
    body: Body,
) -> Response {
    debug!(%peer, %proc, %method, "http call");
    let mut stream = HttpStream::new(peer, proc, method, body);

    let served = dispatcher.serve_stream(&mut stream).await;
    match served {
        Ok(_) => (
            [(header::CONTENT_TYPE, CONTENT_TYPE)],
            stream.into_response_body(),
        )
            .into_response(),
        Err(err) => {
            warn!(peer = stream.peer(), %err, "http call aborted");
            (error_status(&err), err.to_string()).into_response()
        }
    }
}

fn error_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::ReadTimeout(_) => StatusCode::REQUEST_TIMEOUT,
        DispatchError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        DispatchError::Decode(_) | DispatchError::Protocol(_) | DispatchError::Frame(_) => {
            StatusCode::BAD_REQUEST
        }
        DispatchError::Render(_) | DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
