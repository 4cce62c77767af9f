//! Request dispatch.
//!
//! Each incoming stream carries exactly one request. A worker serves it
//! through a fixed sequence:
//!
//! 1. read the request until the caller half-closes, bounded in time and size
//! 2. close the read side and decode the request
//! 3. route the stream's process address and resolve the method
//! 4. reserve the process with the request body and run the method
//! 5. render the outcome and write it, then half-close
//! 6. release the reservation and drop the stream
//!
//! Failures in steps 3 and 4 are reported to the caller as a result status.
//! Failures in steps 1, 2 and 5 abort the stream without a result, since
//! there is no request to answer or no way to answer it.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use prost::Message;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use ww_runtime::{CallError, Context, Process, Reservation, RouteError, Router};
use ww_wire::{CallData, FrameError, Status};

use crate::config::DispatcherConfig;
use crate::protocol::{Mode, ProtocolError};
use crate::render::{
    self, GuestError, InvalidMethod, InvalidRequest, MethodNotFound, Outcome, ProcNotFound,
    RenderError, RoutingError, Success,
};
use crate::stream::Stream;

/// Longest accepted method name, in bytes.
pub const MAX_METHOD_LEN: usize = 255;

/// Failures that abort a stream without a result.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The caller did not half-close within the read timeout.
    #[error("request not received within {0:?}")]
    ReadTimeout(Duration),

    /// The request outgrew the configured message size.
    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// The request bytes are not a valid call.
    #[error("malformed request: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The stream carried an unsupported protocol id.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A length-prefixed frame could not be read or written.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The result could not be rendered or written.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Reading from or closing the stream failed.
    #[error("stream error: {0}")]
    Io(#[from] io::Error),
}

/// Serves call streams against the processes of a [`Router`].
pub struct Dispatcher {
    router: Arc<dyn Router>,
    config: DispatcherConfig,
    root: Context,
}

impl Dispatcher {
    pub fn new(router: Arc<dyn Router>, config: DispatcherConfig) -> Self {
        Self {
            router,
            config,
            root: Context::background(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Stop accepting streams and cancel in-flight calls.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.root.err().is_some()
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub async fn closed(&self) {
        self.root.done().await;
    }

    /// Serve streams from `incoming` until it ends or the dispatcher shuts
    /// down, one worker per stream. Returns after every worker has finished.
    pub async fn serve<S, I>(self: Arc<Self>, incoming: I)
    where
        S: Stream + 'static,
        I: futures::Stream<Item = S> + Send,
    {
        let mut incoming = std::pin::pin!(incoming);
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                next = incoming.next() => match next {
                    Some(stream) => {
                        let dispatcher = Arc::clone(&self);
                        workers.spawn(async move { dispatcher.serve_detached(stream).await });
                    }
                    None => break,
                },
                _ = self.root.done() => break,
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    log_join(joined);
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            log_join(joined);
        }
        debug!("dispatcher stopped");
    }

    /// Serve one stream, logging rather than returning failures.
    pub async fn serve_detached<S: Stream>(&self, stream: S) {
        match self.serve_stream(stream).await {
            Ok(status) => debug!(%status, "stream served"),
            Err(err) => warn!(%err, "stream aborted"),
        }
    }

    /// Serve one stream to completion.
    ///
    /// Returns the status reported to the caller, or, for a cast, the
    /// status that would have been reported.
    #[instrument(level = "debug", skip_all, fields(proc = %stream.proc(), mode = ?stream.mode()))]
    pub async fn serve_stream<S: Stream>(&self, mut stream: S) -> Result<Status, DispatchError> {
        let request = self.read_request(&mut stream).await?;
        stream.close_read().await?;

        let mode = stream.mode();
        if mode == Mode::Cast {
            stream.close_write().await?;
        }

        let ctx = match self.config.call_timeout {
            Some(timeout) => self.root.with_timeout(timeout),
            None => self.root.child(),
        };
        let hint = stream.method().map(str::to_owned);
        let routed = self.router.get_proc(stream.proc());

        let mut reservation = None;
        let outcome = call(&ctx, &routed, hint.as_deref(), request, &mut reservation).await;

        let status = match mode {
            Mode::Call => {
                // Not derived from root: a call cut short by shutdown still
                // reports why.
                let write_ctx = Context::background().with_timeout(self.config.write_timeout);
                render::respond(&mut stream, &write_ctx, outcome.as_ref())
                    .await?
                    .status()
            }
            Mode::Cast => {
                let mut result = ww_wire::CallResult::default();
                render::render(&mut result, outcome.as_ref())?;
                if !result.is_ok() {
                    info!(status = %result.status(), info = %result.info, "cast failed");
                }
                result.status()
            }
        };

        drop(reservation);
        Ok(status)
    }

    async fn read_request<S: Stream>(&self, stream: &mut S) -> Result<CallData, DispatchError> {
        let limit = self.config.max_message_size;
        let mut buf = Vec::new();
        let mut limited = (&mut *stream).take(limit as u64 + 1);

        match tokio::time::timeout(self.config.read_timeout, limited.read_to_end(&mut buf)).await {
            Err(_) => return Err(DispatchError::ReadTimeout(self.config.read_timeout)),
            Ok(read) => read?,
        };
        if buf.len() > limit {
            return Err(DispatchError::TooLarge { limit });
        }
        Ok(CallData::decode(buf.as_slice())?)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Report a worker that panicked; cancelled workers are expected.
pub(crate) fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        if err.is_panic() {
            warn!(%err, "stream worker panicked");
        }
    }
}

/// Steps 3 and 4: route, resolve, reserve, call.
///
/// The reservation is parked in `slot` so that it outlives the response.
async fn call<'p>(
    ctx: &Context,
    routed: &'p Result<Arc<Process>, RouteError>,
    hint: Option<&str>,
    request: CallData,
    slot: &mut Option<Reservation<'p>>,
) -> Box<dyn Outcome> {
    let process = match routed {
        Ok(process) => process,
        Err(RouteError::NotFound(pid)) => {
            return Box::new(ProcNotFound::new(format!("process not found: {pid}")))
        }
        Err(err) => return Box::new(RoutingError::new(err.to_string())),
    };

    let name = match resolve_method(&request.method, hint) {
        Ok(name) => name,
        Err(info) => return Box::new(InvalidMethod::new(info)),
    };
    let Some(method) = process.method(name) else {
        return Box::new(MethodNotFound::new(format!("method not found: {name}")));
    };
    if request.stack.len() != method.params() {
        return Box::new(InvalidRequest::new(format!(
            "{name} takes {} arguments, got {}",
            method.params(),
            request.stack.len()
        )));
    }

    let reservation = match process.reserve(ctx, request.body).await {
        Ok(reservation) => slot.insert(reservation),
        Err(err) => return Box::new(GuestError::new(err.to_string())),
    };

    match method.call(reservation, ctx, &request.stack).await {
        Ok(stack) => Box::new(Success::new(stack)),
        Err(err @ CallError::Arity { .. }) => Box::new(InvalidRequest::new(err.to_string())),
        Err(err) => {
            debug!(method = name, %err, "call failed");
            Box::new(GuestError::new(err.to_string()))
        }
    }
}

/// Pick the method to call from the request and the stream address.
///
/// Either may name it; if both do they must agree.
pub fn resolve_method<'a>(requested: &'a str, hint: Option<&'a str>) -> Result<&'a str, String> {
    let name = match (requested, hint) {
        ("", Some(hint)) => hint,
        ("", None) => return Err("no method named".to_string()),
        (requested, Some(hint)) if requested != hint => {
            return Err(format!(
                "request names method {requested:?} but stream is addressed to {hint:?}"
            ))
        }
        (requested, _) => requested,
    };
    validate_method(name)?;
    Ok(name)
}

/// Check that `name` could be an exported method.
pub fn validate_method(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty method name".to_string());
    }
    if name.len() > MAX_METHOD_LEN {
        return Err(format!("method name exceeds {MAX_METHOD_LEN} bytes"));
    }
    if name.starts_with('_') {
        return Err(format!("method {name:?} is reserved"));
    }
    if name
        .chars()
        .any(|c| c == '/' || c.is_whitespace() || c.is_control())
    {
        return Err(format!("invalid method name {name:?}"));
    }
    Ok(())
}
