//! Varint length-prefixed framing.
//!
//! Each frame is an unsigned LEB128 length followed by that many bytes.
//! [`FrameCodec`] plugs into `tokio_util::codec` for transports that carry
//! many messages; [`read_frame`] reads exactly one frame and nothing more,
//! which matters when the bytes after it belong to someone else.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum encoded length of a u64 varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Default upper bound on a frame body (1 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 1 << 20;

/// Framing errors. All of them are fatal to the stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The length prefix announces more than the configured limit.
    #[error("frame of {len} bytes exceeds limit of {limit} bytes")]
    TooLarge { len: u64, limit: usize },

    /// The length prefix is not a valid u64 varint.
    #[error("malformed frame length")]
    Varint,

    /// The underlying transport failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append `value` as an unsigned varint.
pub fn put_uvarint(dst: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Decode an unsigned varint from the front of `src`.
///
/// Returns the value and the number of bytes it occupied, or `None` if
/// `src` ends before the varint does.
pub fn get_uvarint(src: &[u8]) -> Result<Option<(u64, usize)>, FrameError> {
    let mut value = 0u64;
    for (i, &byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        if byte < 0x80 {
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(FrameError::Varint);
            }
            return Ok(Some((value | (byte as u64) << (7 * i), i + 1)));
        }
        value |= ((byte & 0x7f) as u64) << (7 * i);
    }

    if src.len() >= MAX_VARINT_LEN {
        Err(FrameError::Varint)
    } else {
        Ok(None)
    }
}

/// Codec for varint length-prefixed frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_len: usize,
}

impl FrameCodec {
    /// Create a codec with the default 1 MiB frame limit.
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a codec that rejects frames longer than `max_len`.
    pub fn with_max_len(max_len: usize) -> Self {
        Self { max_len }
    }

    /// The frame limit.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    fn check_len(&self, len: u64) -> Result<usize, FrameError> {
        if len > self.max_len as u64 {
            return Err(FrameError::TooLarge {
                len,
                limit: self.max_len,
            });
        }
        Ok(len as usize)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        let Some((len, prefix)) = get_uvarint(src)? else {
            return Ok(None);
        };
        let len = self.check_len(len)?;

        if src.len() < prefix + len {
            src.reserve(prefix + len - src.len());
            return Ok(None);
        }

        src.advance(prefix);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.check_len(item.len() as u64)?;
        dst.reserve(MAX_VARINT_LEN + item.len());
        put_uvarint(dst, item.len() as u64);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Read exactly one frame from `reader`.
///
/// The prefix is consumed a byte at a time so nothing past the end of the
/// frame is pulled off the transport.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Bytes, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; MAX_VARINT_LEN];
    let mut len = None;
    for i in 0..MAX_VARINT_LEN {
        prefix[i] = reader.read_u8().await?;
        if let Some((value, _)) = get_uvarint(&prefix[..=i])? {
            len = Some(value);
            break;
        }
    }
    let len = len.ok_or(FrameError::Varint)?;
    if len > max_len as u64 {
        return Err(FrameError::TooLarge {
            len,
            limit: max_len,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(Bytes::from(body))
}

/// Write one frame to `writer`.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = BytesMut::with_capacity(MAX_VARINT_LEN + body.len());
    put_uvarint(&mut buf, body.len() as u64);
    buf.extend_from_slice(body);
    writer.write_all(&buf).await?;
    Ok(())
}
