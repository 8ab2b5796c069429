use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const CHUNK_SIZE: usize = 8192;

/// Streams an inbound request body chunk by chunk as it arrives.
///
/// The connection may already have read past the request head; those
/// bytes live in `buffer` and are drained before the socket is read
/// again. The body is framed by Content-Length; `next_chunk` returns
/// `None` once the advertised length has been delivered.
pub struct BodyReader<'a, R> {
    stream: &'a mut R,
    buffer: &'a mut BytesMut,
    remaining: usize,
}

impl<'a, R: AsyncRead + Unpin> BodyReader<'a, R> {
    pub fn new(stream: &'a mut R, buffer: &'a mut BytesMut, content_length: usize) -> Self {
        Self {
            stream,
            buffer,
            remaining: content_length,
        }
    }

    /// The next chunk of the body, or `None` when the body is complete.
    pub async fn next_chunk(&mut self) -> anyhow::Result<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }

        if !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.remaining);
            let chunk = self.buffer.split_to(take).freeze();
            self.remaining -= chunk.len();
            return Ok(Some(chunk));
        }

        let mut temp = [0u8; CHUNK_SIZE];
        let want = self.remaining.min(CHUNK_SIZE);
        let n = self.stream.read(&mut temp[..want]).await?;

        if n == 0 {
            anyhow::bail!("connection closed before complete body received");
        }

        self.remaining -= n;
        Ok(Some(Bytes::copy_from_slice(&temp[..n])))
    }
}
