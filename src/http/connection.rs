use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::files::StaticFiles;
use crate::http::body::BodyReader;
use crate::http::parser::{ParseError, parse_request_head};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseSink;
use crate::proxy::forwarder::Forwarder;
use crate::proxy::router::Router;

/// Request handling state shared by every connection.
///
/// Built once at startup from the immutable configuration; read-only at
/// request time, so concurrent connections need no synchronization.
pub struct Handler {
    pub router: Router,
    pub forwarder: Forwarder,
    pub static_files: StaticFiles,
}

pub struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    handler: Arc<Handler>,
}

impl Connection {
    pub fn new(stream: TcpStream, handler: Arc<Handler>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            handler,
        }
    }

    /// Serve requests on this connection until it closes.
    ///
    /// Static responses honor the client's keep-alive preference; proxied
    /// responses always close the connection once the relay finishes.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let request = match self.read_request_head().await? {
                Some(req) => req,
                None => return Ok(()), // client closed
            };

            tracing::info!(method = %request.method, path = %request.path, "Request");

            let keep_alive = self.handle_request(&request).await?;
            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Dispatch one request to the proxy or the file responder.
    ///
    /// Returns whether the connection should be kept open for the next
    /// request.
    async fn handle_request(&mut self, request: &Request) -> anyhow::Result<bool> {
        let components = request.path_components();
        tracing::debug!(components = ?components, "Path components");

        let handler = Arc::clone(&self.handler);

        if handler.router.is_routable(&components) {
            tracing::info!("Request will use proxy");

            // Bodies are only streamed for methods that forward them; for
            // everything else the inbound body stays unread.
            let content_length = if request.method.forwards_body() {
                request.content_length()
            } else {
                0
            };

            let (mut read_half, write_half) = self.stream.split();
            let mut sink = ResponseSink::new(write_half);

            match handler.router.resolve(&components) {
                Ok(route) => {
                    let mut body =
                        BodyReader::new(&mut read_half, &mut self.buffer, content_length);
                    handler
                        .forwarder
                        .relay(route, request, &mut body, &mut sink)
                        .await?;
                }
                Err(_) => {
                    // No network call is made on this path.
                    sink.send(&Response::plain(StatusCode::NotFound, "Not found\nProxy"))
                        .await?;
                }
            }

            // Upstream body framing may rely on connection close, and any
            // unread inbound body would corrupt the next request.
            return Ok(false);
        }

        let response = handler.static_files.serve(&components).await;
        self.discard_body(request.content_length()).await?;

        let (_, write_half) = self.stream.split();
        let mut sink = ResponseSink::new(write_half);
        sink.send(&response).await?;

        Ok(request.keep_alive())
    }

    /// Read from the socket until a complete request head has been parsed.
    ///
    /// Returns `None` when the client closes between requests. Body bytes
    /// that arrive with the head stay in the buffer.
    pub async fn read_request_head(&mut self) -> anyhow::Result<Option<Request>> {
        loop {
            // Try parsing whatever we already have
            match parse_request_head(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => {
                    // Malformed request → report and drop the connection
                    let (_, write_half) = self.stream.split();
                    let mut sink = ResponseSink::new(write_half);
                    sink.send(&Response::plain(StatusCode::BadRequest, "Bad request"))
                        .await?;
                    return Err(anyhow::anyhow!("HTTP parse error: {:?}", e));
                }
            }

            // Read more data
            let mut temp = [0u8; 1024];
            let n = self.stream.read(&mut temp).await?;

            if n == 0 {
                // Client closed connection
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    /// Discard an inbound body the responder did not consume, so the next
    /// request on a keep-alive connection parses cleanly.
    async fn discard_body(&mut self, content_length: usize) -> anyhow::Result<()> {
        let mut remaining = content_length;

        let take = self.buffer.len().min(remaining);
        self.buffer.advance(take);
        remaining -= take;

        let mut temp = [0u8; 1024];
        while remaining > 0 {
            let want = remaining.min(temp.len());
            let n = self.stream.read(&mut temp[..want]).await?;
            if n == 0 {
                anyhow::bail!("connection closed before complete body received");
            }
            remaining -= n;
        }

        Ok(())
    }
}
