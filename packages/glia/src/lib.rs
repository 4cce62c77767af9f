//! # ww-glia
//!
//! Call dispatch for sandboxed processes. Callers open a stream addressed to
//! a process, write one protobuf [`CallData`], and half-close; the
//! [`Dispatcher`] routes the stream, runs the method under an exclusive
//! reservation, and writes back one [`CallResult`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use ww_glia::{tcp, Dispatcher, DispatcherConfig};
//! use ww_runtime::Registry;
//!
//! let registry = Arc::new(Registry::default());
//! registry.spawn(std::fs::read("echo.wasm")?)?;
//!
//! let dispatcher = Arc::new(Dispatcher::new(registry, DispatcherConfig::default()));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:2020").await?;
//! tcp::serve(listener, dispatcher).await?;
//! ```
//!
//! ## Bindings
//!
//! - overlay streams: any async byte stream plus its protocol id,
//!   see [`OverlayStream`]
//! - TCP: a varint-framed protocol id, then an overlay stream, see [`tcp`]
//! - HTTP: `POST /ww/0.1.0/{peer}/{proc}/{method}`, see [`http`]
//!
//! [`CallData`]: ww_wire::CallData
//! [`CallResult`]: ww_wire::CallResult

pub mod client;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod protocol;
pub mod render;
pub mod stream;
pub mod tcp;

pub use config::DispatcherConfig;
pub use dispatch::{resolve_method, validate_method, DispatchError, Dispatcher, MAX_METHOD_LEN};
pub use protocol::{Address, Mode, ProtocolError, HTTP_ROUTE, PROTOCOL_BASE, PROTOCOL_VERSION};
pub use render::{render, respond, Outcome, RenderError};
pub use stream::{OverlayStream, Stream};
