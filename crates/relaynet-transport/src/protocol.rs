//! Wire protocol for relaynet
//!
//! One envelope per TCP connection, encoded as a single JSON document. The
//! sender terminates it with `\n`; the receiver accepts either a newline or
//! the end of the stream as the terminator. The receiver may answer with one
//! [`Ack`] line.

use bytes::Bytes;
use relaynet_core::{Ack, Envelope, EnvelopeError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Maximum frame size (1 MB)
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Maximum acknowledgment line size
pub const MAX_ACK_BYTES: usize = 4 * 1024;

/// Errors that can occur during framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Connection closed before a frame was received")]
    Empty,

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode an envelope as one newline-terminated frame
pub fn frame_envelope(envelope: &Envelope, max: usize) -> Result<Bytes, FramingError> {
    let line = envelope.to_line()?;
    // the terminator does not count toward the limit
    if line.len() - 1 > max {
        return Err(FramingError::TooLarge {
            size: line.len() - 1,
            max,
        });
    }
    Ok(Bytes::from(line))
}

/// Encode an acknowledgment line
pub fn frame_ack(ack: &Ack) -> Result<Bytes, FramingError> {
    Ok(Bytes::from(ack.to_line()?))
}

/// Read one frame terminated by `\n` or by end of stream
///
/// The terminator is stripped. At most `max` payload bytes are read; a
/// longer frame is rejected without buffering the rest of it.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Vec<u8>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    let read = reader.take(limit).read_until(b'\n', &mut buf).await?;

    if read == 0 {
        return Err(FramingError::Empty);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if buf.len() > max {
        return Err(FramingError::TooLarge {
            size: buf.len(),
            max,
        });
    }
    Ok(buf)
}

/// Read and decode one envelope frame
pub async fn read_envelope<R>(reader: &mut R, max: usize) -> Result<Envelope, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let frame = read_frame(reader, max).await?;
    Ok(Envelope::from_slice(&frame)?)
}

/// Read and decode one acknowledgment line
pub async fn read_ack<R>(reader: &mut R) -> Result<Ack, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let frame = read_frame(reader, MAX_ACK_BYTES).await?;
    Ok(Ack::from_slice(&frame)?)
}
