//! # ww-wire
//!
//! Wire-level types for glia, the synchronous call protocol spoken between
//! hosts and the sandboxed processes they supervise.
//!
//! This is the narrow waist of the stack. Nothing here knows about sandboxes,
//! routing or transports - it only describes what goes over the wire:
//!
//! - [`Pid`] - the 160-bit opaque process identifier and its base58 string form
//! - [`CallData`] / [`CallResult`] / [`Status`] - the request and result schemas
//! - [`FrameCodec`], [`read_frame`], [`write_frame`] - varint length-prefixed
//!   framing for carrying several messages over one byte stream
//!
//! # Example
//!
//! ```rust
//! use ww_wire::{Bytes, CallData, Pid};
//! use prost::Message;
//!
//! let pid = Pid::new();
//! assert_eq!(pid.to_string().parse::<Pid>().unwrap(), pid);
//!
//! let request = CallData::new("add", vec![2, 3], Bytes::new());
//! let bytes = request.encode_to_vec();
//! assert_eq!(CallData::decode(bytes.as_slice()).unwrap(), request);
//! ```

pub use bytes::Bytes;

mod frame;
mod message;
mod pid;

pub use frame::{
    get_uvarint, put_uvarint, read_frame, write_frame, FrameCodec, FrameError,
    DEFAULT_MAX_FRAME_LEN, MAX_VARINT_LEN,
};
pub use message::{CallData, CallResult, Status, Word};
pub use pid::{Pid, PidError, PID_LEN};
