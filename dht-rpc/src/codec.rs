//! Length-prefixed framing: a 4-byte big-endian length followed by a
//! bincode-encoded envelope. TCP is a byte stream, not a message stream, so
//! every frame needs an explicit boundary (§6: "each message carries ... a
//! length prefix").

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    FrameTooLarge(u32),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = bincode::serialize(value)?;
    let len = u32::try_from(encoded.len()).map_err(|_| CodecError::FrameTooLarge(u32::MAX))?;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len));
    }
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, CodecError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(bincode::deserialize(&buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{Envelope, Request};

    #[tokio::test]
    async fn frame_round_trips_through_an_in_memory_duplex() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let sent = Envelope {
            correlation_id: 42,
            deadline_ms: 2_000,
            body: Request::Ping,
        };
        write_frame(&mut a, &sent).await.unwrap();
        let received: Envelope<Request> = read_frame(&mut b).await.unwrap();
        assert_eq!(received.correlation_id, 42);
        assert!(matches!(received.body, Request::Ping));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_allocating() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: Result<Envelope<Request>, CodecError> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(CodecError::FrameTooLarge(_))));
    }
}
