//! Length-prefixed bincode framing.
//!
//! Every surface of the node (peer gossip, directory, art-app) speaks
//! the same frame format: a big-endian u32 payload length followed by
//! the bincode encoding of one serde value.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::NetworkError;

/// Upper bound on a single frame; anything larger is a protocol error.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Serialize `value` and write it as one frame.
///
/// # Errors
/// Returns an error on serialization failure or a broken transport.
pub async fn write_frame<T, W>(writer: &mut W, value: &T) -> Result<(), NetworkError>
where
    T: Serialize + ?Sized,
    W: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(value).map_err(|e| NetworkError::Codec(e.to_string()))?;

    if payload.len() > MAX_FRAME_LEN {
        return Err(NetworkError::FrameTooLarge(payload.len()));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and deserialize it.
///
/// # Errors
/// Returns an error on a closed or broken transport, an oversized
/// frame, or a payload that does not decode as `T`.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<T, NetworkError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(NetworkError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    bincode::deserialize(&payload).map_err(|e| NetworkError::Codec(e.to_string()))
}
