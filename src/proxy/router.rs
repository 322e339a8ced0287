//! Destination resolution
//!
//! Chooses the tunnel or forward path from the request method and
//! resolves the upstream authority.

use url::Url;

use crate::error::{ProxyError, Result};
use crate::proxy::request::ParsedRequest;

/// Default port for CONNECT targets (typically TLS)
const DEFAULT_TUNNEL_PORT: u16 = 443;
/// Default port for plain-HTTP forwarding
const DEFAULT_FORWARD_PORT: u16 = 80;

/// Methods the forward path accepts
const FORWARD_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];

/// Resolved route for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Opaque bidirectional tunnel (CONNECT)
    Tunnel { host: String, port: u16 },
    /// Plain-HTTP request forwarding
    Forward { host: String, port: u16 },
}

impl Route {
    /// Resolve the route for a parsed request
    pub fn resolve(request: &ParsedRequest) -> Result<Self> {
        if request.method.eq_ignore_ascii_case("CONNECT") {
            let (host, port) = parse_authority(&request.target, DEFAULT_TUNNEL_PORT)?;
            return Ok(Route::Tunnel { host, port });
        }

        if !FORWARD_METHODS
            .iter()
            .any(|m| request.method.eq_ignore_ascii_case(m))
        {
            return Err(ProxyError::UnsupportedMethod(request.method.clone()));
        }

        // Absolute-form targets carry their own authority; origin-form
        // targets rely on the Host header.
        if request.target.starts_with("http://") || request.target.starts_with("https://") {
            let url = Url::parse(&request.target).map_err(|e| {
                ProxyError::MalformedRequest(format!("invalid request target: {}", e))
            })?;
            let host = url
                .host_str()
                .ok_or_else(|| {
                    ProxyError::MalformedRequest("request target has no host".to_string())
                })?
                .to_string();
            let port = url.port().unwrap_or(DEFAULT_FORWARD_PORT);
            return Ok(Route::Forward { host, port });
        }

        let authority = request.host().ok_or(ProxyError::MissingHost)?;
        let (host, port) = parse_authority(authority, DEFAULT_FORWARD_PORT)?;
        Ok(Route::Forward { host, port })
    }

    /// Destination as a dialable `host:port` string
    pub fn addr(&self) -> String {
        match self {
            Route::Tunnel { host, port } | Route::Forward { host, port } => {
                format!("{}:{}", host, port)
            }
        }
    }
}

/// Parse `host[:port]` authority form, defaulting the port
///
/// Bracketed IPv6 literals keep their brackets out of the host and only
/// split on a colon that follows the closing bracket.
pub fn parse_authority(authority: &str, default_port: u16) -> Result<(String, u16)> {
    if authority.is_empty() {
        return Err(ProxyError::MalformedRequest("empty authority".to_string()));
    }

    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(|| {
            ProxyError::MalformedRequest(format!("unclosed IPv6 literal: {authority:?}"))
        })?;
        let port = match after.strip_prefix(':') {
            None if after.is_empty() => default_port,
            Some(port_str) => port_str.parse::<u16>().map_err(|_| {
                ProxyError::MalformedRequest(format!("invalid port in authority: {authority:?}"))
            })?,
            None => {
                return Err(ProxyError::MalformedRequest(format!(
                    "invalid authority: {authority:?}"
                )))
            }
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse::<u16>().map_err(|_| {
                ProxyError::MalformedRequest(format!("invalid port in authority: {authority:?}"))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), default_port)),
    }
}
