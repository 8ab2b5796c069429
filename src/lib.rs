//! Switchboard - Static site server with an API proxy
//!
//! Serves files from a local directory and transparently forwards
//! configured path prefixes to remote upstream hosts.

pub mod config;
pub mod files;
pub mod http;
pub mod proxy;
pub mod server;
