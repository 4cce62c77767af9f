//! Caller side of a call stream.

use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use ww_wire::{CallData, CallResult};

use crate::dispatch::DispatchError;
use crate::protocol::Mode;

/// Send `request` on `io` and, for a call, read back the result.
///
/// The write side is closed after the request so the server sees its end.
/// Returns `None` for a cast, or if the server closed the stream without a
/// result (an oversized, malformed or timed-out request).
pub async fn call<S>(
    mut io: S,
    mode: Mode,
    request: &CallData,
    max_result_size: usize,
) -> Result<Option<CallResult>, DispatchError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    io.write_all(&request.encode_to_vec()).await?;
    io.shutdown().await?;
    if mode == Mode::Cast {
        return Ok(None);
    }

    let mut buf = Vec::new();
    (&mut io)
        .take(max_result_size as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    if buf.len() > max_result_size {
        return Err(DispatchError::TooLarge {
            limit: max_result_size,
        });
    }
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(CallResult::decode(buf.as_slice())?))
}
