//! Connection-handling engine
//!
//! This module provides the proxy core:
//! - raw HTTP/1.x header framing from the client byte stream
//! - destination resolution (tunnel vs forward)
//! - CONNECT tunnels with bidirectional byte relay
//! - plain-HTTP request forwarding with response relay
//! - bounded per-connection worker dispatch with graceful shutdown

pub mod forward;
pub mod relay;
pub mod request;
pub mod router;
pub mod server;
pub mod tunnel;

pub use request::ParsedRequest;
pub use router::Route;
pub use server::ProxyServer;
