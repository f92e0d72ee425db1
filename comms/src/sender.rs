use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{LEN_TYPE_SIZE, LenType, MAX_FRAME_LEN, Serialize};

/// Writes length prefixed frames to a peer.
pub struct FrameSender<W: AsyncWrite + Unpin> {
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` as a single frame.
    ///
    /// The message writes its header into an internal buffer and may hand back a borrowed
    /// body, which is written straight from the caller's memory after the header.
    ///
    /// # Errors
    /// An `io::Error` if the frame is over the size limit or the peer is gone.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(&[0; LEN_TYPE_SIZE]);

        let body = msg.serialize(&mut self.buf);
        let len = self.buf.len() - LEN_TYPE_SIZE + body.map_or(0, <[u8]>::len);

        if len > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} bytes limit"),
            ));
        }

        self.buf[..LEN_TYPE_SIZE].copy_from_slice(&(len as LenType).to_be_bytes());
        self.tx.write_all(&self.buf).await?;
        if let Some(body) = body {
            self.tx.write_all(body).await?;
        }

        self.tx.flush().await
    }
}
