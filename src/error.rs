use thiserror::Error;

/// Unified error type for the Passage proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    // Request framing/parsing errors
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Missing Host header")]
    MissingHost,

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    // Upstream errors
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Body read failed: {0}")]
    BodyReadError(String),

    #[error("Relay error: {0}")]
    RelayError(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Passage operations
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    /// The raw HTTP response sent to the client before closing, if any.
    ///
    /// Returns the status line and a short plain-text body. Errors that
    /// close the connection silently (CONNECT dial failures, relay
    /// teardown) return `None`.
    pub fn client_response(&self) -> Option<(&'static str, &'static str)> {
        match self {
            ProxyError::MalformedRequest(_) => Some(("400 Bad Request", "Malformed request")),
            ProxyError::MissingHost => Some(("400 Bad Request", "Missing Host header")),
            ProxyError::UnsupportedMethod(_) => {
                Some(("405 Method Not Allowed", "Unsupported method"))
            }
            ProxyError::BodyReadError(_) => Some(("400 Bad Request", "Request body read failed")),
            // Tunnel dial failures close without a response; the forward
            // path maps its own dial failure to a 502 before this point.
            ProxyError::UpstreamUnreachable(_)
            | ProxyError::RelayError(_)
            | ProxyError::InvalidConfig(_)
            | ProxyError::Io(_) => None,
        }
    }

    /// Check if this error was caused by the client (bad request framing)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ProxyError::MalformedRequest(_)
                | ProxyError::MissingHost
                | ProxyError::UnsupportedMethod(_)
                | ProxyError::BodyReadError(_)
        )
    }
}
