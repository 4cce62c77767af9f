//! Result rendering.
//!
//! Every call produces an [`Outcome`]. Rendering an outcome fills in a
//! [`CallResult`]; the result is then serialized onto the stream and the
//! write side is closed. An outcome that leaves the status unset is a
//! programming error and is rejected before anything reaches the wire.

use std::io;

use prost::Message;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::trace;
use ww_runtime::{Context, ContextError};
use ww_wire::{CallResult, Status, Word};

use crate::stream::Stream;

/// Rendering failures.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An outcome left the status unset.
    #[error("outcome did not set a result status")]
    StatusNotSet,

    /// The write deadline passed or the write was cancelled.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Writing or closing the stream failed.
    #[error("failed to write result: {0}")]
    Io(#[from] io::Error),
}

/// The result of handling one request.
pub trait Outcome: Send + Sync {
    /// Fill in `result`. Must set a status.
    fn render(&self, result: &mut CallResult);
}

/// The method returned normally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Success {
    pub stack: Vec<Word>,
}

impl Success {
    pub fn new(stack: Vec<Word>) -> Self {
        Self { stack }
    }
}

impl Outcome for Success {
    fn render(&self, result: &mut CallResult) {
        result.set_status(Status::Ok);
        result.stack.clone_from(&self.stack);
    }
}

macro_rules! failure {
    ($(#[$doc:meta])* $name:ident => $status:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(info: impl Into<String>) -> Self {
                Self(info.into())
            }
        }

        impl Outcome for $name {
            fn render(&self, result: &mut CallResult) {
                result.set_status($status);
                result.info.clone_from(&self.0);
            }
        }
    };
}

failure! {
    /// The request was well formed but unusable, e.g. wrong argument count.
    InvalidRequest => Status::InvalidRequest
}

failure! {
    /// The target could not be resolved.
    RoutingError => Status::RoutingError
}

failure! {
    /// No live process has the target Pid.
    ProcNotFound => Status::ProcNotFound
}

failure! {
    /// The method name is malformed or contradicts the stream address.
    InvalidMethod => Status::InvalidMethod
}

failure! {
    /// The process exports no such method.
    MethodNotFound => Status::MethodNotFound
}

failure! {
    /// The guest trapped, failed, or was interrupted.
    GuestError => Status::GuestError
}

/// Render `outcome` into `result`.
pub fn render(result: &mut CallResult, outcome: &dyn Outcome) -> Result<(), RenderError> {
    outcome.render(result);
    // Unknown status values decode as Unset too.
    if result.status() == Status::Unset {
        return Err(RenderError::StatusNotSet);
    }
    Ok(())
}

/// Render `outcome`, write it to `stream`, and close the write side.
///
/// Gives up with the context's error if `ctx` finishes first.
pub async fn respond<S: Stream + ?Sized>(
    stream: &mut S,
    ctx: &Context,
    outcome: &dyn Outcome,
) -> Result<CallResult, RenderError> {
    let mut result = CallResult::default();
    render(&mut result, outcome)?;
    let bytes = result.encode_to_vec();

    let write = async {
        stream.write_all(&bytes).await?;
        stream.close_write().await
    };
    tokio::select! {
        written = write => written?,
        err = ctx.done() => return Err(err.into()),
    }

    trace!(status = %result.status(), len = bytes.len(), "result written");
    Ok(result)
}
