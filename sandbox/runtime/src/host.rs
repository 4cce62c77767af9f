//! Host functions imported by guest modules.
//!
//! Guests import these from the `ww` module:
//!
//! | Import            | Signature          | Meaning                                        |
//! |-------------------|--------------------|------------------------------------------------|
//! | `ww.read`         | `(ptr, len) -> n`  | copy up to `len` body bytes to `ptr`; 0 at EOF |
//! | `ww.write`        | `(ptr, len) -> n`  | append `len` bytes at `ptr` to the output      |
//! | `ww.done`         | `() -> code`       | 0 live, 1 cancelled, 2 deadline exceeded       |
//!
//! `read` and `write` return -1 when the range falls outside guest memory or
//! the guest exports no memory.

use std::ops::Range;

use bytes::{Buf, Bytes, BytesMut};
use wasmtime::{Caller, Linker, Memory};

use crate::context::{Context, ContextError};

/// Import module name.
pub const HOST_MODULE: &str = "ww";

/// Per-process state held by the Wasmtime store.
///
/// `body` and `ctx` are only populated while a reservation or call is in
/// progress; `output` is reset at the start of every call.
#[derive(Debug, Default)]
pub struct HostState {
    pub(crate) body: Option<Bytes>,
    pub(crate) output: BytesMut,
    pub(crate) ctx: Option<Context>,
}

pub(crate) fn add_to_linker(linker: &mut Linker<HostState>) -> wasmtime::Result<()> {
    linker.func_wrap(HOST_MODULE, "read", read)?;
    linker.func_wrap(HOST_MODULE, "write", write)?;
    linker.func_wrap(HOST_MODULE, "done", done)?;
    Ok(())
}

fn memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    caller.get_export("memory").and_then(|e| e.into_memory())
}

fn guest_range(memory_len: usize, ptr: i32, len: i32) -> Option<Range<usize>> {
    let start = usize::try_from(ptr).ok()?;
    let end = start.checked_add(usize::try_from(len).ok()?)?;
    (end <= memory_len).then_some(start..end)
}

fn read(mut caller: Caller<'_, HostState>, ptr: i32, len: i32) -> i32 {
    let Some(memory) = memory(&mut caller) else {
        return -1;
    };
    let (data, state) = memory.data_and_store_mut(&mut caller);
    let Some(range) = guest_range(data.len(), ptr, len) else {
        return -1;
    };
    let Some(body) = state.body.as_mut() else {
        return 0;
    };

    let n = range.len().min(body.len());
    data[range.start..range.start + n].copy_from_slice(&body[..n]);
    body.advance(n);
    n as i32
}

fn write(mut caller: Caller<'_, HostState>, ptr: i32, len: i32) -> i32 {
    let Some(memory) = memory(&mut caller) else {
        return -1;
    };
    let (data, state) = memory.data_and_store_mut(&mut caller);
    let Some(range) = guest_range(data.len(), ptr, len) else {
        return -1;
    };

    state.output.extend_from_slice(&data[range]);
    len
}

fn done(caller: Caller<'_, HostState>) -> i32 {
    match caller.data().ctx.as_ref().and_then(Context::err) {
        None => 0,
        Some(ContextError::Cancelled) => 1,
        Some(ContextError::DeadlineExceeded) => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_range_bounds() {
        assert_eq!(guest_range(16, 0, 16), Some(0..16));
        assert_eq!(guest_range(16, 8, 0), Some(8..8));
        assert_eq!(guest_range(16, 8, 9), None);
        assert_eq!(guest_range(16, -1, 4), None);
        assert_eq!(guest_range(16, 0, -4), None);
    }
}
