//! Error types for the sandbox runtime.

use thiserror::Error;
use ww_wire::Pid;

use crate::context::ContextError;

/// Errors raised while creating or managing processes.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Wasmtime rejected the engine, module, linker or instance.
    #[error("sandbox error ({stage}): {message}")]
    Sandbox { stage: &'static str, message: String },

    /// A process with this Pid is already registered.
    #[error("process already registered: {0}")]
    AlreadyRegistered(Pid),

    /// The registry is full.
    #[error("maximum processes reached ({0})")]
    Capacity(usize),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub(crate) fn sandbox(stage: &'static str, error: impl std::fmt::Display) -> Self {
        RuntimeError::Sandbox {
            stage,
            message: format!("{error:#}"),
        }
    }
}

/// Errors raised by a method call.
#[derive(Debug, Error)]
pub enum CallError {
    /// The caller's context finished before or during the call.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The argument count does not match the method's signature.
    #[error("method {method} takes {expected} arguments, got {got}")]
    Arity {
        method: String,
        expected: usize,
        got: usize,
    },

    /// The method was called under another process's reservation.
    #[error("method {0} does not belong to the reserved process")]
    ForeignMethod(String),

    /// The guest trapped or otherwise failed.
    #[error("{0}")]
    Guest(String),
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
