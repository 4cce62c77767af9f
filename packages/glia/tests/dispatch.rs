mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_stream::wrappers::ReceiverStream;
use ww_glia::{client, Address, DispatchError, Dispatcher, DispatcherConfig};
use ww_runtime::Context;
use ww_wire::{Bytes, CallData, Pid, Status};

use common::{call, pair, roundtrip, setup};

#[tokio::test]
async fn test_echo_writes_body_to_output() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());

    let result = call(
        &dispatcher,
        Address::call(process.pid()),
        CallData::new("echo", vec![], "hello world"),
    )
    .await;
    assert_eq!(result.status(), Status::Ok);
    assert!(result.stack.is_empty());
    assert!(result.info.is_empty());

    // Output stays with the process until its next call.
    let reservation = process
        .reserve(&Context::background(), Bytes::new())
        .await
        .unwrap();
    assert_eq!(reservation.output(), "hello world");
}

#[tokio::test]
async fn test_method_named_by_address() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());

    let result = call(
        &dispatcher,
        Address::call(process.pid()).with_method("add"),
        CallData::new("", vec![2, 3], Bytes::new()),
    )
    .await;
    assert_eq!(result.status(), Status::Ok);
    assert_eq!(result.stack, vec![5]);

    // naming it in both places is fine when they agree
    let result = call(
        &dispatcher,
        Address::call(process.pid()).with_method("add"),
        CallData::new("add", vec![u64::MAX, 2], Bytes::new()),
    )
    .await;
    assert_eq!(result.stack, vec![1]);
}

#[tokio::test]
async fn test_unknown_process() {
    let (_registry, _process, dispatcher) = setup(DispatcherConfig::default());
    let pid = Pid::new();

    let result = call(
        &dispatcher,
        Address::call(pid),
        CallData::new("echo", vec![], Bytes::new()),
    )
    .await;
    assert_eq!(result.status(), Status::ProcNotFound);
    assert!(result.info.contains(&pid.to_string()));
}

#[tokio::test]
async fn test_malformed_process_address() {
    let (_registry, _process, dispatcher) = setup(DispatcherConfig::default());

    let result = call(
        &dispatcher,
        Address::call("0OIl"),
        CallData::new("echo", vec![], Bytes::new()),
    )
    .await;
    assert_eq!(result.status(), Status::RoutingError);
    assert!(!result.info.is_empty());
}

#[tokio::test]
async fn test_method_resolution_failures() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());
    let pid = process.pid();

    let cases = [
        (Address::call(pid), "missing", Status::MethodNotFound),
        (Address::call(pid), "_initialize", Status::InvalidMethod),
        (Address::call(pid), "a/b", Status::InvalidMethod),
        (Address::call(pid), "", Status::InvalidMethod),
        (Address::call(pid).with_method("echo"), "add", Status::InvalidMethod),
        (Address::call(pid), "memory", Status::MethodNotFound),
    ];
    for (address, method, status) in cases {
        let result = call(
            &dispatcher,
            address,
            CallData::new(method, vec![], Bytes::new()),
        )
        .await;
        assert_eq!(result.status(), status, "method {method:?}");
        assert!(result.stack.is_empty());
    }
}

#[tokio::test]
async fn test_wrong_argument_count() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());

    let result = call(
        &dispatcher,
        Address::call(process.pid()),
        CallData::new("add", vec![1], Bytes::new()),
    )
    .await;
    assert_eq!(result.status(), Status::InvalidRequest);
    assert!(result.info.contains("add"));
}

#[tokio::test]
async fn test_guest_trap_reported() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());

    let result = call(
        &dispatcher,
        Address::call(process.pid()),
        CallData::new("fail", vec![], Bytes::new()),
    )
    .await;
    assert_eq!(result.status(), Status::GuestError);
    assert!(result.info.contains("unreachable"), "{}", result.info);

    // the reservation was released and the process still works
    let result = call(
        &dispatcher,
        Address::call(process.pid()),
        CallData::new("add", vec![1, 1], Bytes::new()),
    )
    .await;
    assert_eq!(result.stack, vec![2]);
}

#[tokio::test]
async fn test_call_timeout_interrupts_guest() {
    let config = DispatcherConfig::default().with_call_timeout(Duration::from_millis(100));
    let (_registry, process, dispatcher) = setup(config);

    let result = call(
        &dispatcher,
        Address::call(process.pid()),
        CallData::new("spin", vec![], Bytes::new()),
    )
    .await;
    assert_eq!(result.status(), Status::GuestError);
    assert_eq!(result.info, "context deadline exceeded");
}

#[tokio::test(start_paused = true)]
async fn test_default_call_timeout_releases_stuck_process() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());
    let timeout = dispatcher.config().call_timeout.expect("bounded by default");

    let spin = |dispatcher: Arc<Dispatcher>| {
        let address = Address::call(process.pid());
        tokio::spawn(async move {
            call(&dispatcher, address, CallData::new("spin", vec![], Bytes::new())).await
        })
    };
    let running = spin(dispatcher.clone());
    let queued = spin(dispatcher.clone());

    // one caller spinning in the guest, the other waiting for the process
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
    tokio::time::advance(timeout + Duration::from_secs(1)).await;

    for caller in [running, queued] {
        let result = caller.await.unwrap();
        assert_eq!(result.status(), Status::GuestError);
        assert_eq!(result.info, "context deadline exceeded");
    }
}

#[tokio::test]
async fn test_oversized_request_aborted() {
    let config = DispatcherConfig::default().with_max_message_size(64);
    let (_registry, process, dispatcher) = setup(config);

    let (served, result) = roundtrip(
        &dispatcher,
        Address::call(process.pid()),
        CallData::new("echo", vec![], vec![7u8; 1024]),
    )
    .await;
    assert!(matches!(served, Err(DispatchError::TooLarge { limit: 64 })));
    assert!(!matches!(result, Ok(Some(_))));
}

#[tokio::test]
async fn test_malformed_request_aborted() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());
    let (mut client, server) = pair(&Address::call(process.pid()));

    client.write_all(&[0xff, 0xff, 0xff]).await.unwrap();
    client.shutdown().await.unwrap();

    assert!(matches!(
        dispatcher.serve_stream(server).await,
        Err(DispatchError::Decode(_))
    ));
    let mut buf = Vec::new();
    client.read_to_end(&mut buf).await.unwrap();
    assert!(buf.is_empty());
}

#[tokio::test]
async fn test_read_timeout() {
    let config = DispatcherConfig::default().with_read_timeout(Duration::from_millis(50));
    let (_registry, process, dispatcher) = setup(config);
    let (mut client, server) = pair(&Address::call(process.pid()));

    // never half-close
    client.write_all(b"\x0a\x04echo").await.unwrap();

    assert!(matches!(
        dispatcher.serve_stream(server).await,
        Err(DispatchError::ReadTimeout(_))
    ));
}

#[tokio::test]
async fn test_cast_runs_without_result() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());

    let (served, result) = roundtrip(
        &dispatcher,
        Address::cast(process.pid()).with_method("count"),
        CallData::new("", vec![], Bytes::new()),
    )
    .await;
    assert_eq!(served.unwrap(), Status::Ok);
    assert!(result.unwrap().is_none());

    let result = call(
        &dispatcher,
        Address::call(process.pid()),
        CallData::new("count", vec![], Bytes::new()),
    )
    .await;
    assert_eq!(result.stack, vec![2]);
}

#[tokio::test]
async fn test_failed_cast_reports_status() {
    let (_registry, _process, dispatcher) = setup(DispatcherConfig::default());

    let (served, result) = roundtrip(
        &dispatcher,
        Address::cast(Pid::new()),
        CallData::new("count", vec![], Bytes::new()),
    )
    .await;
    assert_eq!(served.unwrap(), Status::ProcNotFound);
    assert!(result.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_serve_is_single_flight_per_process() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let server = tokio::spawn(dispatcher.clone().serve(ReceiverStream::new(rx)));

    let mut callers = Vec::new();
    for _ in 0..32 {
        let address = Address::call(process.pid()).with_method("count");
        let (client, stream) = pair(&address);
        tx.send(stream).await.unwrap();
        callers.push(tokio::spawn(async move {
            let request = CallData::new("", vec![], Bytes::new());
            client::call(client, address.mode, &request, 1024).await
        }));
    }

    let mut seen = BTreeSet::new();
    for caller in callers {
        let result = caller.await.unwrap().unwrap().unwrap();
        assert_eq!(result.status(), Status::Ok);
        assert!(seen.insert(result.stack[0]));
    }
    assert_eq!(seen, (1..=32).collect::<BTreeSet<_>>());

    drop(tx);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_cancels_calls_and_stops_serving() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    let server = tokio::spawn(dispatcher.clone().serve(ReceiverStream::new(rx)));

    let address = Address::call(process.pid());
    let (client, stream) = pair(&address);
    tx.send(stream).await.unwrap();
    let caller = tokio::spawn(async move {
        let request = CallData::new("spin", vec![], Bytes::new());
        client::call(client, address.mode, &request, 1024).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    dispatcher.shutdown();
    assert!(dispatcher.is_shutdown());

    let result = caller.await.unwrap().unwrap().unwrap();
    assert_eq!(result.status(), Status::GuestError);
    assert_eq!(result.info, "context canceled");

    // the channel is still open, yet serve returns
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    drop(tx);
}
