//! # ww-runtime
//!
//! The sandbox side of glia. A host instantiates WebAssembly modules as
//! [`Process`]es, registers them in a [`Registry`], and hands the registry to
//! a dispatcher as its [`Router`].
//!
//! ## Processes
//!
//! A process is a single Wasmtime instance. Its exported functions whose
//! signature is made only of `i64` values form its method table; each
//! argument and result is one 64-bit word.
//!
//! Callers get exclusive access through [`Process::reserve`], which yields a
//! [`Reservation`]. At most one reservation is open per process at any time;
//! concurrent callers wait in line, and each wait can be abandoned through
//! its [`Context`]. The reservation carries the call's input body, which the
//! guest reads through the `ww.read` import, and exposes what the guest wrote
//! through `ww.write`.
//!
//! ```ignore
//! use ww_runtime::{Context, Registry, Router};
//!
//! let registry = Registry::default();
//! let process = registry.spawn(std::fs::read("echo.wasm")?)?;
//!
//! let ctx = Context::background();
//! let mut reservation = process.reserve(&ctx, "hello").await?;
//! let echo = process.method("echo").unwrap();
//! echo.call(&mut reservation, &ctx, &[]).await?;
//! assert_eq!(reservation.output(), "hello");
//! ```
//!
//! ## Cancellation
//!
//! Every blocking operation takes a [`Context`]. A context that finishes
//! while waiting for a reservation aborts the wait with no side effects. One
//! that finishes during a call interrupts the guest, and the call fails with
//! the context's own error so callers can tell their timeout from a guest
//! fault.

pub mod context;
pub mod error;
pub mod host;
pub mod process;
pub mod router;

pub use context::{Context, ContextError};
pub use error::{CallError, Result, RuntimeError};
pub use host::{HostState, HOST_MODULE};
pub use process::{Method, Process, Reservation};
pub use router::{Registry, RegistryConfig, RouteError, Router};
