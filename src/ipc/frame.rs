//! Length-prefixed framing over a byte stream.
//!
//! Each frame is a little-endian `u32` length followed by that many bytes.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one frame. Returns `None` on a clean end of stream between frames.
///
/// The declared length is checked before the payload is allocated.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    // Only an end of stream before the first header byte is clean.
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let size = u32::from_le_bytes(header) as usize;
    if size > max {
        return Err(FrameError::TooLarge { size, max });
    }

    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > max || payload.len() > u32::MAX as usize {
        return Err(FrameError::TooLarge {
            size: payload.len(),
            max,
        });
    }

    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_back_to_back() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"one", 64).await.unwrap();
        write_frame(&mut a, b"", 64).await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b, 64).await.unwrap().unwrap(), b"one");
        assert_eq!(read_frame(&mut b, 64).await.unwrap().unwrap(), b"");
        assert!(read_frame(&mut b, 64).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&1_000_000u32.to_le_bytes()).await.unwrap();

        assert!(matches!(
            read_frame(&mut b, 1024).await,
            Err(FrameError::TooLarge { size: 1_000_000, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_io_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&10u32.to_le_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        assert!(matches!(read_frame(&mut b, 64).await, Err(FrameError::Io(_))));
    }

    #[tokio::test]
    async fn test_truncated_header_is_io_error() {
        for cut in 1..4 {
            let (mut a, mut b) = tokio::io::duplex(64);
            a.write_all(&7u32.to_le_bytes()[..cut]).await.unwrap();
            drop(a);

            match read_frame(&mut b, 64).await {
                Err(FrameError::Io(e)) => {
                    assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof)
                }
                other => panic!("header cut after {} byte(s): {:?}", cut, other),
            }
        }
    }

    #[tokio::test]
    async fn test_write_refuses_oversized() {
        let (mut a, _b) = tokio::io::duplex(64);
        assert!(write_frame(&mut a, &[0u8; 100], 10).await.is_err());
    }
}
