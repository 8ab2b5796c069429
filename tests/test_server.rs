//! End-to-end tests over real sockets: listener, dispatcher, proxy, and
//! static fallback together.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use switchboard::config::{Config, RouteConfig, ServerConfig, StaticFilesConfig};
use switchboard::server::listener::Listener;

fn temp_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "switchboard-e2e-{}-{}",
        std::process::id(),
        name
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn start_server(root: PathBuf, routes: Vec<RouteConfig>) -> SocketAddr {
    let cfg = Config {
        server: ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
        },
        static_files: StaticFilesConfig { root },
        routes,
    };

    let listener = Listener::bind(&cfg).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = listener.serve().await;
    });
    addr
}

async fn send_request(addr: SocketAddr, raw: &[u8]) -> String {
    let mut sock = TcpStream::connect(addr).await.unwrap();
    sock.write_all(raw).await.unwrap();

    let mut out = Vec::new();
    sock.read_to_end(&mut out).await.unwrap();
    String::from_utf8_lossy(&out).to_string()
}

#[tokio::test]
async fn test_unmatched_path_falls_through_to_files() {
    let root = temp_root("unmatched");
    let addr = start_server(
        root,
        vec![RouteConfig {
            prefix: "/example/api/".to_string(),
            upstream: "https://api.example.com/v1/".to_string(),
        }],
    )
    .await;

    let resp = send_request(
        addr,
        b"GET /other/thing HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(resp.contains("Content-Type: text/plain; charset=utf-8"));
    assert!(resp.contains("Not found\nFile:"));
}

#[tokio::test]
async fn test_static_index_served_at_root() {
    let root = temp_root("index");
    std::fs::write(root.join("index.html"), "<h1>home</h1>").unwrap();

    let addr = start_server(root, Vec::new()).await;

    let resp = send_request(
        addr,
        b"GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(resp.contains("Content-Type: text/html; charset=utf-8"));
    assert!(resp.ends_with("<h1>home</h1>"));
}

#[tokio::test]
async fn test_matched_prefix_is_proxied_with_suffix() {
    let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream_listener.local_addr().unwrap();

    let upstream = tokio::spawn(async move {
        let (mut sock, _) = upstream_listener.accept().await.unwrap();

        let mut seen = Vec::new();
        let mut tmp = [0u8; 1024];
        while seen.windows(4).all(|w| w != b"\r\n\r\n") {
            let n = sock.read(&mut tmp).await.unwrap();
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&tmp[..n]);
        }

        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\npong")
            .await
            .unwrap();
        sock.shutdown().await.unwrap();
        seen
    });

    let root = temp_root("proxied");
    let addr = start_server(
        root,
        vec![RouteConfig {
            prefix: "/example/api/".to_string(),
            upstream: format!("http://{upstream_addr}/v1/"),
        }],
    )
    .await;

    let resp = send_request(
        addr,
        b"GET /example/api/ping HTTP/1.1\r\nHost: test\r\nUser-Agent: e2e\r\nAuthorization: Bearer xyz\r\n\r\n",
    )
    .await;

    let seen = String::from_utf8_lossy(&upstream.await.unwrap()).to_string();
    assert!(seen.starts_with("GET /v1/ping HTTP/1.0\r\n"));
    assert!(seen.contains("User-Agent: e2e\r\n"));
    assert!(!seen.contains("Authorization"));

    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(resp.contains("Content-Type: text/plain"));
    assert!(resp.ends_with("pong"));
}

#[tokio::test]
async fn test_proxied_connection_refused_returns_500() {
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let root = temp_root("refused");
    let addr = start_server(
        root,
        vec![RouteConfig {
            prefix: "/example/api/".to_string(),
            upstream: format!("http://{dead_addr}/v1/"),
        }],
    )
    .await;

    let resp = send_request(
        addr,
        b"GET /example/api/ping HTTP/1.1\r\nHost: test\r\n\r\n",
    )
    .await;

    assert!(resp.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(resp.contains("Content-Type: text/plain; charset=utf-8"));
    assert!(resp.contains("Request failed:"));
}

#[tokio::test]
async fn test_keep_alive_serves_two_static_requests() {
    let root = temp_root("keepalive");
    std::fs::write(root.join("a.html"), "aaa").unwrap();
    std::fs::write(root.join("b.html"), "bbb").unwrap();

    let addr = start_server(root, Vec::new()).await;

    let mut sock = TcpStream::connect(addr).await.unwrap();

    sock.write_all(b"GET /a.html HTTP/1.1\r\nHost: test\r\n\r\n")
        .await
        .unwrap();
    let first = read_one_response(&mut sock).await;
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.ends_with("aaa"));

    sock.write_all(b"GET /b.html HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut rest = Vec::new();
    sock.read_to_end(&mut rest).await.unwrap();
    let second = String::from_utf8_lossy(&rest);
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(second.ends_with("bbb"));
}

/// Read exactly one Content-Length-framed response from the socket.
async fn read_one_response(sock: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];

    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..pos]).to_string();
            let content_length: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("Content-Length: "))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            if buf.len() >= pos + 4 + content_length {
                return String::from_utf8_lossy(&buf[..pos + 4 + content_length]).to_string();
            }
        }

        let n = sock.read(&mut tmp).await.unwrap();
        assert!(n > 0, "connection closed mid-response");
        buf.extend_from_slice(&tmp[..n]);
    }
}
