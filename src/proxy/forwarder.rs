//! Upstream request forwarding.
//!
//! Builds the outbound request for a matched route, streams the inbound
//! body to it when the method calls for one, and relays the upstream
//! response back through the client's response sink.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use url::Url;

use crate::http::body::BodyReader;
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseSink;
use crate::proxy::router::{Route, Router};

/// Default buffer size for streaming
const BUFFER_SIZE: usize = 8192;

/// Cap on upstream response head size
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Header names allowed to cross the proxy boundary, in either direction.
///
/// Applied identically when copying inbound request headers to the
/// outbound request and upstream response headers to the final response.
/// Everything else is dropped and logged, never forwarded.
pub const ALLOWED_HEADERS: [&str; 10] = [
    "accept",
    "accept-encoding",
    "accept-language",
    "user-agent",
    "cookie",
    "content-type",
    "content-length",
    "content-encoding",
    "date",
    "apigw-requestid",
];

/// Copy only allow-listed headers, comparing names case-insensitively.
pub fn copy_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    let mut copied = HashMap::new();

    for (name, value) in headers {
        if ALLOWED_HEADERS
            .iter()
            .any(|allowed| name.eq_ignore_ascii_case(allowed))
        {
            copied.insert(name.clone(), value.clone());
        } else {
            tracing::debug!(header = %name, value = %value, "Skipped header");
        }
    }

    copied
}

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Forwards matched requests to their upstream and relays the response.
///
/// Each relay opens its own outbound connection; there is no pooling, no
/// retry, and no upstream timeout, so a hung upstream holds its request
/// open.
pub struct Forwarder {
    tls: TlsConnector,
}

impl Forwarder {
    pub fn new() -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            tls: TlsConnector::from(Arc::new(config)),
        }
    }

    /// Relay one matched request to its upstream.
    ///
    /// The response head is written to `sink` exactly once: either the
    /// upstream's own status with allow-list-filtered headers, or a
    /// synthetic 500 when the outbound call fails before the upstream
    /// head has been committed. Failures after that point propagate to
    /// the caller, which can only drop the connection.
    pub async fn relay<R, W>(
        &self,
        route: &Route,
        request: &Request,
        body: &mut BodyReader<'_, R>,
        sink: &mut ResponseSink<W>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let normalized = Router::normalize_path(&request.path_components());
        let suffix = normalized.strip_prefix(route.prefix.as_str()).unwrap_or("");
        tracing::debug!(suffix = %suffix, "Proxy suffix");

        let target = format!("{}{}", route.upstream, suffix);
        tracing::info!(target = %target, "Full target URL");

        let target = match Url::parse(&target) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(target = %target, error = %e, "Invalid upstream target URL");
                return self
                    .synthetic_error(sink, format!("Request failed: {e}"))
                    .await;
            }
        };

        match self.exchange(&target, request, body, sink).await {
            Ok(()) => Ok(()),
            Err(e) if !sink.head_written() => {
                tracing::error!(error = %e, "Request failed");
                self.synthetic_error(sink, format!("Request failed: {e:#}"))
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Serialize the outbound request head for the target URL.
    ///
    /// The method is copied verbatim from the inbound request; headers go
    /// through the allow-list; Host is set from the target. The outbound
    /// leg speaks HTTP/1.0 so upstreams reply without chunked encoding and
    /// the relay can frame bodies by Content-Length or connection close.
    pub fn build_request_head(request: &Request, target: &Url) -> String {
        let mut head = format!("{} {} HTTP/1.0\r\n", request.method, target.path());

        let mut headers = copy_headers(&request.headers);

        if let Some(host) = target.host_str() {
            let host_value = match target.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            headers.insert("Host".to_string(), host_value);
        }

        headers.insert("Connection".to_string(), "close".to_string());

        for (name, value) in &headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        head
    }

    async fn exchange<R, W>(
        &self,
        target: &Url,
        request: &Request,
        body: &mut BodyReader<'_, R>,
        sink: &mut ResponseSink<W>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut upstream = self.connect(target).await?;

        let head = Self::build_request_head(request, target);
        upstream.write_all(head.as_bytes()).await?;

        // Only POST and PUT stream the inbound body; every other method
        // finalizes the outbound request with an empty body.
        if request.method.forwards_body() {
            while let Some(chunk) = body.next_chunk().await? {
                upstream.write_all(&chunk).await?;
            }
        }
        upstream.flush().await?;

        let (status, reason, headers, mut buffered) = read_response_head(&mut upstream).await?;
        tracing::info!(status = status, "Upstream status");

        let mut response_headers = copy_headers(&headers);
        // The relay closes the client connection once the upstream body
        // ends, since that body may itself be delimited by connection
        // close.
        response_headers.insert("Connection".to_string(), "close".to_string());

        sink.write_head(status, &reason, &response_headers).await?;

        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok());

        relay_body(&mut upstream, sink, &mut buffered, content_length).await?;
        sink.end().await
    }

    async fn connect(&self, target: &Url) -> Result<Box<dyn Io>> {
        let host = target.host_str().context("Target URL missing host")?;
        let port = target.port().unwrap_or(match target.scheme() {
            "https" => 443,
            _ => 80,
        });

        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("Failed to connect to {host}:{port}"))?;

        tracing::trace!(host = %host, port = port, "Connected to upstream");

        if target.scheme() == "https" {
            let server_name = ServerName::try_from(host.to_string())
                .context("Invalid TLS server name")?;
            let tls = self
                .tls
                .connect(server_name, stream)
                .await
                .with_context(|| format!("TLS handshake with {host} failed"))?;
            Ok(Box::new(tls))
        } else {
            Ok(Box::new(stream))
        }
    }

    async fn synthetic_error<W: AsyncWrite + Unpin>(
        &self,
        sink: &mut ResponseSink<W>,
        detail: String,
    ) -> Result<()> {
        let response = Response::plain(StatusCode::InternalServerError, detail);
        sink.send(&response).await
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the upstream response head, returning the status, reason phrase,
/// headers, and whatever body bytes were read past the blank line.
async fn read_response_head<S: AsyncRead + Unpin>(
    stream: &mut S,
) -> Result<(u16, String, HashMap<String, String>, BytesMut)> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        if let Some(headers_end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let head_bytes = buffer.split_to(headers_end + 4);
            let (status, reason, headers) = parse_response_head(&head_bytes)?;
            return Ok((status, reason, headers, buffer));
        }

        // Prevent unbounded header growth
        if buffer.len() > MAX_HEAD_SIZE {
            anyhow::bail!("Response headers too large");
        }

        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            anyhow::bail!("Connection closed before complete response received");
        }
    }
}

/// Parse an upstream response head. Status code and reason phrase are
/// kept verbatim for pass-through.
pub fn parse_response_head(bytes: &[u8]) -> Result<(u16, String, HashMap<String, String>)> {
    let text = std::str::from_utf8(bytes).context("Invalid UTF-8 in response headers")?;

    let mut lines = text.lines();

    let status_line = lines.next().context("Empty response")?;
    let mut parts = status_line.splitn(3, ' ');

    let _version = parts.next().context("Invalid status line")?;
    let status: u16 = parts
        .next()
        .context("Invalid status line")?
        .parse()
        .context("Invalid status code")?;
    let reason = parts.next().unwrap_or("").to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    Ok((status, reason, headers))
}

/// Stream the upstream response body to the client sink, chunk by chunk
/// in arrival order: exactly Content-Length bytes when advertised, until
/// EOF otherwise.
async fn relay_body<S, W>(
    upstream: &mut S,
    sink: &mut ResponseSink<W>,
    buffered: &mut BytesMut,
    content_length: Option<usize>,
) -> Result<()>
where
    S: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut temp = [0u8; BUFFER_SIZE];

    match content_length {
        Some(mut remaining) => {
            if !buffered.is_empty() {
                let take = buffered.len().min(remaining);
                let chunk = buffered.split_to(take);
                sink.write_chunk(&chunk).await?;
                remaining -= take;
            }

            while remaining > 0 {
                let want = remaining.min(BUFFER_SIZE);
                let n = upstream.read(&mut temp[..want]).await?;
                if n == 0 {
                    anyhow::bail!("Connection closed before complete body received");
                }
                sink.write_chunk(&temp[..n]).await?;
                remaining -= n;
            }
        }
        None => {
            if !buffered.is_empty() {
                sink.write_chunk(buffered).await?;
                buffered.clear();
            }

            loop {
                let n = upstream.read(&mut temp).await?;
                if n == 0 {
                    break;
                }
                sink.write_chunk(&temp[..n]).await?;
            }
        }
    }

    Ok(())
}
