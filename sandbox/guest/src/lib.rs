//! Example guest process.
//!
//! Build with `cargo build -p ww-guest --target wasm32-unknown-unknown --release`
//! and spawn the resulting module in a registry. Every exported function
//! takes and returns only `u64` words, so each one is a callable method.

use std::sync::atomic::{AtomicU64, Ordering};

#[link(wasm_import_module = "ww")]
extern "C" {
    fn read(ptr: *mut u8, len: i32) -> i32;
    fn write(ptr: *const u8, len: i32) -> i32;
    fn done() -> i32;
}

static CALLS: AtomicU64 = AtomicU64::new(0);

/// Copy the call body to the output.
#[no_mangle]
pub extern "C" fn echo() {
    let mut buf = [0u8; 4096];
    loop {
        let n = unsafe { read(buf.as_mut_ptr(), buf.len() as i32) };
        if n <= 0 {
            break;
        }
        unsafe { write(buf.as_ptr(), n) };
    }
}

#[no_mangle]
pub extern "C" fn add(a: u64, b: u64) -> u64 {
    a.wrapping_add(b)
}

/// Number of times this method has been called, including this one.
#[no_mangle]
pub extern "C" fn count() -> u64 {
    CALLS.fetch_add(1, Ordering::Relaxed) + 1
}

/// Sum the body as little-endian words. A trailing partial word is ignored.
#[no_mangle]
pub extern "C" fn sum() -> u64 {
    let mut total = 0u64;
    let mut word = [0u8; 8];
    while unsafe { read(word.as_mut_ptr(), 8) } == 8 {
        total = total.wrapping_add(u64::from_le_bytes(word));
    }
    total
}

/// Block until the caller gives up; returns 1 if cancelled, 2 on deadline.
#[no_mangle]
pub extern "C" fn wait() -> u64 {
    loop {
        let code = unsafe { done() };
        if code != 0 {
            return code as u64;
        }
    }
}
