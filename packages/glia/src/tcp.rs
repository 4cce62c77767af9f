//! Plain TCP binding.
//!
//! A connection opens with one varint-framed protocol id, after which it is
//! an overlay stream: the request follows until the caller half-closes, and
//! the result comes back the same way.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use ww_wire::{read_frame, write_frame, CallData, CallResult};

use crate::client;
use crate::dispatch::{log_join, DispatchError, Dispatcher};
use crate::protocol::{Address, ProtocolError};
use crate::stream::OverlayStream;

/// Longest accepted protocol id, in bytes.
pub const MAX_PROTOCOL_LEN: usize = 256;

/// Read the protocol header from `io` and wrap it as an overlay stream.
pub async fn accept<S>(mut io: S) -> Result<OverlayStream<S>, DispatchError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = read_frame(&mut io, MAX_PROTOCOL_LEN).await?;
    let protocol = std::str::from_utf8(&header)
        .map_err(|_| ProtocolError::Unsupported(String::from_utf8_lossy(&header).into_owned()))?;
    Ok(OverlayStream::new(protocol, io)?)
}

/// Write the protocol header for `address` to `io`.
pub async fn open<S>(mut io: S, address: &Address) -> Result<OverlayStream<S>, DispatchError>
where
    S: AsyncWrite + Unpin,
{
    write_frame(&mut io, address.to_string().as_bytes()).await?;
    Ok(OverlayStream::from_address(address.clone(), io))
}

/// Accept connections on `listener` and dispatch them until the dispatcher
/// shuts down.
pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "serving tcp");
    let mut workers = JoinSet::new();

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = dispatcher.closed() => break,
        };
        debug!(%peer, "connection accepted");

        let dispatcher = Arc::clone(&dispatcher);
        workers.spawn(async move {
            let header_timeout = dispatcher.config().read_timeout;
            match tokio::time::timeout(header_timeout, accept(socket)).await {
                Ok(Ok(stream)) => dispatcher.serve_detached(stream).await,
                Ok(Err(err)) => warn!(%peer, %err, "rejected connection"),
                Err(_) => warn!(%peer, "no protocol header within {header_timeout:?}"),
            }
        });

        while let Some(joined) = workers.try_join_next() {
            log_join(joined);
        }
    }

    while let Some(joined) = workers.join_next().await {
        log_join(joined);
    }
    Ok(())
}

/// Connect to `addr` and make one call.
pub async fn call(
    addr: impl ToSocketAddrs,
    address: &Address,
    request: &CallData,
) -> Result<Option<CallResult>, DispatchError> {
    let socket = TcpStream::connect(addr).await?;
    socket.set_nodelay(true)?;
    let stream = open(socket, address).await?;
    client::call(stream, address.mode, request, ww_wire::DEFAULT_MAX_FRAME_LEN).await
}
