//! Protocol addressing.
//!
//! Overlay streams are opened with a path-style protocol id that names the
//! target process and, optionally, the method:
//!
//! ```text
//! /ww/0.1.0/proc/<pid>[/<method>]     call: one request, one result
//! /ww/0.1.0/cast/<pid>[/<method>]     cast: one request, no result
//! ```
//!
//! The HTTP binding uses [`HTTP_ROUTE`] instead.

use std::fmt;

use thiserror::Error;

/// First path segment of every protocol id.
pub const PROTOCOL_BASE: &str = "ww";

/// Protocol version segment.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Route template for the HTTP binding.
pub const HTTP_ROUTE: &str = "/ww/0.1.0/{peer}/{proc}/{method}";

/// Protocol id errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not a glia protocol id.
    #[error("unsupported protocol: {0}")]
    Unsupported(String),

    /// A glia protocol id for another version.
    #[error("unsupported protocol version {found}, expected {PROTOCOL_VERSION}")]
    Version { found: String },

    /// The process segment is missing or empty.
    #[error("no process in protocol id: {0}")]
    MissingProc(String),
}

/// Whether the caller expects a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Synchronous call: exactly one result is written back.
    #[default]
    Call,
    /// Fire-and-forget: the stream is closed without a result.
    Cast,
}

impl Mode {
    fn segment(self) -> &'static str {
        match self {
            Mode::Call => "proc",
            Mode::Cast => "cast",
        }
    }
}

/// A parsed overlay protocol id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub mode: Mode,
    pub proc: String,
    pub method: Option<String>,
}

impl Address {
    /// Address a synchronous call to `proc`.
    pub fn call(proc: impl ToString) -> Self {
        Self {
            mode: Mode::Call,
            proc: proc.to_string(),
            method: None,
        }
    }

    /// Address a cast to `proc`.
    pub fn cast(proc: impl ToString) -> Self {
        Self {
            mode: Mode::Cast,
            proc: proc.to_string(),
            method: None,
        }
    }

    /// Name the method in the address.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Parse a protocol id.
    pub fn parse(protocol: &str) -> Result<Self, ProtocolError> {
        let unsupported = || ProtocolError::Unsupported(protocol.to_string());

        let mut segments = protocol.strip_prefix('/').ok_or_else(unsupported)?.split('/');
        if segments.next() != Some(PROTOCOL_BASE) {
            return Err(unsupported());
        }
        match segments.next() {
            Some(PROTOCOL_VERSION) => {}
            Some(found) => {
                return Err(ProtocolError::Version {
                    found: found.to_string(),
                })
            }
            None => return Err(unsupported()),
        }

        let mode = match segments.next() {
            Some("proc") => Mode::Call,
            Some("cast") => Mode::Cast,
            _ => return Err(unsupported()),
        };
        let proc = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProtocolError::MissingProc(protocol.to_string()))?;
        let method = segments.next().filter(|s| !s.is_empty()).map(String::from);
        if segments.next().is_some() {
            return Err(unsupported());
        }

        Ok(Self {
            mode,
            proc: proc.to_string(),
            method,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}",
            PROTOCOL_BASE,
            PROTOCOL_VERSION,
            self.mode.segment(),
            self.proc
        )?;
        if let Some(method) = &self.method {
            write!(f, "/{}", method)?;
        }
        Ok(())
    }
}
