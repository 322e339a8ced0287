//! Passage - Forward HTTP/HTTPS Proxy
//!
//! A forward proxy that clients configure as their outbound proxy.
//!
//! ## Features
//!
//! - Raw HTTP/1.x header framing straight off the socket, no external parser
//! - CONNECT tunneling with opaque bidirectional byte relay
//! - Plain-HTTP forwarding with verbatim header and body pass-through
//! - Bounded worker pool with explicit admission control
//! - Cooperative shutdown that drains in-flight connections

pub mod config;
pub mod error;
pub mod proxy;

pub use config::Config;
pub use error::{ProxyError, Result};
pub use proxy::ProxyServer;
