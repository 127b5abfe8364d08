//! Length prefixed JSON framing shared by the daemon and the cli.
//!
//! Every frame is a 4 byte big endian length followed by that many bytes of
//! `serde_json`.
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{constants::MAX_FRAME_LEN, messages::Message, prelude::*};

pub async fn write_message<W, M>(stream: &mut W, message: &M) -> Result<()>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > MAX_FRAME_LEN as usize {
        return Err(Error::FrameTooLarge {
            len: bytes.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let num_bytes = bytes.len() as u32;
    stream.write_all(&num_bytes.to_be_bytes()).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_message<R, M>(stream: &mut R) -> Result<M>
where
    R: AsyncRead + Unpin,
    M: Message,
{
    let mut num_bytes = [0u8; 4];
    stream.read_exact(&mut num_bytes).await?;
    let num_bytes = u32::from_be_bytes(num_bytes);
    if num_bytes > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len: num_bytes as usize,
            max: MAX_FRAME_LEN,
        });
    }

    let mut message_bytes = vec![0u8; num_bytes as usize];
    stream.read_exact(&mut message_bytes).await?;
    Ok(serde_json::from_slice(&message_bytes)?)
}

/// true when the error only means the peer hung up
pub fn is_disconnect(err: &Error) -> bool {
    matches!(err, Error::DaemonFileError(e) if matches!(
        e.kind(),
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
    ))
}
