//! Prefix-routed API proxying.
//!
//! The router decides whether a request path is bound for an upstream;
//! the forwarder relays matched requests and streams the responses back.

pub mod forwarder;
pub mod router;

pub use forwarder::Forwarder;
pub use router::{Route, RouteError, RouteTable, Router};
