#![allow(dead_code)]

use std::sync::Arc;

use tokio::io::DuplexStream;
use ww_glia::{client, Address, DispatchError, Dispatcher, DispatcherConfig, OverlayStream};
use ww_runtime::{Process, Registry};
use ww_wire::{CallData, CallResult, Status};

pub const GUEST: &str = r#"
    (module
      (import "ww" "read" (func $read (param i32 i32) (result i32)))
      (import "ww" "write" (func $write (param i32 i32) (result i32)))
      (memory (export "memory") 1)
      (global $count (mut i64) (i64.const 0))

      (func (export "echo")
        (local $n i32)
        (block $eof
          (loop $copy
            (local.set $n (call $read (i32.const 0) (i32.const 4096)))
            (br_if $eof (i32.le_s (local.get $n) (i32.const 0)))
            (drop (call $write (i32.const 0) (local.get $n)))
            (br $copy))))

      (func (export "add") (param i64 i64) (result i64)
        (i64.add (local.get 0) (local.get 1)))

      (func (export "count") (result i64)
        (global.set $count (i64.add (global.get $count) (i64.const 1)))
        (global.get $count))

      (func (export "fail")
        unreachable)

      (func (export "spin")
        (loop $forever (br $forever))))
"#;

pub fn setup(config: DispatcherConfig) -> (Arc<Registry>, Arc<Process>, Arc<Dispatcher>) {
    let registry = Arc::new(Registry::default());
    let process = registry.spawn(GUEST).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), config));
    (registry, process, dispatcher)
}

/// A connected pair: the server end wrapped as an overlay stream.
pub fn pair(address: &Address) -> (DuplexStream, OverlayStream<DuplexStream>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (client, OverlayStream::from_address(address.clone(), server))
}

/// Run one request through `dispatcher` over an in-memory overlay stream.
pub async fn roundtrip(
    dispatcher: &Dispatcher,
    address: Address,
    request: CallData,
) -> (
    Result<Status, DispatchError>,
    Result<Option<CallResult>, DispatchError>,
) {
    let (client, server) = pair(&address);
    tokio::join!(
        dispatcher.serve_stream(server),
        client::call(client, address.mode, &request, 1 << 20)
    )
}

/// Like [`roundtrip`], for requests expected to produce a result.
pub async fn call(dispatcher: &Dispatcher, address: Address, request: CallData) -> CallResult {
    let (served, result) = roundtrip(dispatcher, address, request).await;
    let result = result.unwrap().expect("a result");
    assert_eq!(served.unwrap(), result.status());
    result
}
