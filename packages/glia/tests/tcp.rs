mod common;

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use ww_glia::{tcp, Address, DispatcherConfig};
use ww_wire::{write_frame, Bytes, CallData, Pid, Status};

use common::setup;

#[tokio::test]
async fn test_tcp_call_roundtrip() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(tcp::serve(listener, dispatcher.clone()));

    let result = tcp::call(
        addr,
        &Address::call(process.pid()).with_method("add"),
        &CallData::new("", vec![20, 22], Bytes::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(result.status(), Status::Ok);
    assert_eq!(result.stack, vec![42]);

    let result = tcp::call(
        addr,
        &Address::call(Pid::new()),
        &CallData::new("add", vec![1, 2], Bytes::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(result.status(), Status::ProcNotFound);

    dispatcher.shutdown();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_tcp_cast() {
    let (_registry, process, dispatcher) = setup(DispatcherConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, dispatcher.clone()));

    let cast = tcp::call(
        addr,
        &Address::cast(process.pid()).with_method("count"),
        &CallData::new("", vec![], Bytes::new()),
    )
    .await
    .unwrap();
    assert!(cast.is_none());

    // casts are not ordered with later calls; poll until it lands
    let mut count = 0;
    for _ in 0..50 {
        let result = tcp::call(
            addr,
            &Address::call(process.pid()),
            &CallData::new("count", vec![], Bytes::new()),
        )
        .await
        .unwrap()
        .unwrap();
        count = result.stack[0];
        if count >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(count >= 2);
    dispatcher.shutdown();
}

#[tokio::test]
async fn test_tcp_rejects_unknown_protocol() {
    let (_registry, _process, dispatcher) = setup(DispatcherConfig::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, dispatcher.clone()));

    let mut socket = TcpStream::connect(addr).await.unwrap();
    write_frame(&mut socket, b"/ww/9.9.9/proc/abc").await.unwrap();

    // the server hangs up without a result
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut buf)).await;
    assert!(read.is_ok());
    assert!(buf.is_empty());
    dispatcher.shutdown();
}
