//! Length-prefixed frame encoding
//!
//! Gives message boundaries over a TCP stream.
//!
//! ```text
//! +----------------+------------------+
//! | length (4 LE)  | JSON payload     |
//! +----------------+------------------+
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("End of stream")]
    EndOfStream,
}

/// Write one message with its length prefix and flush
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = serde_json::to_vec(message).map_err(|e| FrameError::Encode(e.to_string()))?;

    let len = bytes.len();
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(len as u32).to_le_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one length-prefixed message
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::EndOfStream);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    if len == 0 {
        return Err(FrameError::InvalidFrame("zero-length frame".to_string()));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    serde_json::from_slice(&buf).map_err(|e| FrameError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::WorkItem;

    #[test]
    fn test_frames_keep_boundaries() {
        tokio_test::block_on(async {
            let mut wire = Vec::new();
            write_frame(&mut wire, &WorkItem::new("Foo", "test_a"))
                .await
                .unwrap();
            write_frame(&mut wire, &WorkItem::new("Bar", "test_b"))
                .await
                .unwrap();

            let len = u32::from_le_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
            assert!(len > 0 && len < wire.len());

            let mut reader = wire.as_slice();
            let first: WorkItem = read_frame(&mut reader).await.unwrap();
            let second: WorkItem = read_frame(&mut reader).await.unwrap();
            assert_eq!(first.to_string(), "Foo#test_a");
            assert_eq!(second.to_string(), "Bar#test_b");

            let end = read_frame::<_, WorkItem>(&mut reader).await;
            assert!(matches!(end, Err(FrameError::EndOfStream)));
        });
    }

    #[test]
    fn test_rejects_oversized_and_empty_frames() {
        tokio_test::block_on(async {
            let huge = ((MAX_FRAME_SIZE + 1) as u32).to_le_bytes();
            let mut reader = &huge[..];
            let result = read_frame::<_, WorkItem>(&mut reader).await;
            assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));

            let empty = 0u32.to_le_bytes();
            let mut reader = &empty[..];
            let result = read_frame::<_, WorkItem>(&mut reader).await;
            assert!(matches!(result, Err(FrameError::InvalidFrame(_))));
        });
    }

    #[test]
    fn test_garbage_payload_is_a_decode_error() {
        tokio_test::block_on(async {
            let mut wire = 3u32.to_le_bytes().to_vec();
            wire.extend_from_slice(b"{x}");
            let mut reader = wire.as_slice();
            let result = read_frame::<_, WorkItem>(&mut reader).await;
            assert!(matches!(result, Err(FrameError::Decode(_))));
        });
    }
}
