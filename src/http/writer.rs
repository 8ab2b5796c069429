use std::collections::HashMap;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Writes an HTTP/1.1 response to the client incrementally.
///
/// The head (status line + headers) is written exactly once; body chunks
/// follow in the order they are handed in; `end` flushes and marks the
/// response complete. Locally-generated responses go out in one shot via
/// `send`.
pub struct ResponseSink<W> {
    stream: W,
    head_written: bool,
    ended: bool,
}

impl<W: AsyncWrite + Unpin> ResponseSink<W> {
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            head_written: false,
            ended: false,
        }
    }

    /// Whether the status line and headers have already gone out.
    ///
    /// Once this is true, no synthetic error response can be written any
    /// more; a failing relay can only drop the connection.
    pub fn head_written(&self) -> bool {
        self.head_written
    }

    /// Write the status line and headers. Callable once.
    pub async fn write_head(
        &mut self,
        status: u16,
        reason: &str,
        headers: &HashMap<String, String>,
    ) -> anyhow::Result<()> {
        if self.head_written {
            return Err(anyhow::anyhow!("response head already written"));
        }

        let mut buf = Vec::new();

        let status_line = format!("{} {} {}\r\n", HTTP_VERSION, status, reason);
        buf.extend_from_slice(status_line.as_bytes());

        for (k, v) in headers {
            buf.extend_from_slice(k.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(v.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        // Header/body separator
        buf.extend_from_slice(b"\r\n");

        self.stream.write_all(&buf).await?;
        self.head_written = true;
        Ok(())
    }

    /// Write one body chunk, in arrival order.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(chunk).await?;
        Ok(())
    }

    /// Finalize the response. Callable once; flushes buffered bytes.
    pub async fn end(&mut self) -> anyhow::Result<()> {
        if self.ended {
            return Err(anyhow::anyhow!("response already ended"));
        }

        self.stream.flush().await?;
        self.ended = true;
        Ok(())
    }

    /// Serialize and send a complete locally-generated response.
    pub async fn send(&mut self, response: &Response) -> anyhow::Result<()> {
        self.write_head(
            response.status.as_u16(),
            response.status.reason_phrase(),
            &response.headers,
        )
        .await?;
        self.write_chunk(&response.body).await?;
        self.end().await
    }
}
