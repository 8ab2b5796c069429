//! HTTP protocol implementation.
//!
//! A small HTTP/1.1 server layer with support for keep-alive connections
//! on the static path and streaming relay on the proxy path.
//!
//! - **`connection`**: per-connection state loop and request dispatch
//! - **`parser`**: parses an incoming request head from a byte buffer
//! - **`request`**: HTTP request head representation and utilities
//! - **`response`**: locally-generated responses with builder pattern
//! - **`body`**: streams an inbound request body chunk by chunk
//! - **`writer`**: response sink writing status+headers once, then chunks
//! - **`mime`**: MIME type detection based on file extensions

pub mod body;
pub mod connection;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
