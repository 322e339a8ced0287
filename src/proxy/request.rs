//! Raw HTTP/1.x request framing and parsing
//!
//! Reads the leading header block off an unstructured byte stream and
//! splits it into method, target, and ordered header fields. No
//! external HTTP parser is involved: the proxy forwards the captured
//! bytes verbatim, so the parse only needs to recover routing
//! information while leaving the raw block untouched.

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{ProxyError, Result};

/// Header block terminator per HTTP/1.x framing
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Read bytes from `reader` up to and including the `\r\n\r\n` terminator.
///
/// Consumes exactly through the terminator; any bytes the transport
/// delivered after it (a pipelined body, early tunnel data) stay in the
/// reader's buffer for whoever reads next. Fails `MalformedRequest` if
/// the peer closes before the terminator appears or if the accumulated
/// block exceeds `max_len`.
pub async fn read_header_block<R>(reader: &mut R, max_len: usize) -> Result<Bytes>
where
    R: AsyncBufRead + Unpin,
{
    let mut block: Vec<u8> = Vec::with_capacity(512);

    loop {
        let (copied, terminator_end) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                return Err(ProxyError::MalformedRequest(
                    "connection closed before end of headers".to_string(),
                ));
            }

            let previous_len = block.len();
            block.extend_from_slice(chunk);

            // The terminator may span the previous chunk boundary, so
            // rescan from up to three bytes back.
            let search_from = previous_len.saturating_sub(HEADER_TERMINATOR.len() - 1);
            let found = block[search_from..]
                .windows(HEADER_TERMINATOR.len())
                .position(|w| w == HEADER_TERMINATOR)
                .map(|pos| search_from + pos + HEADER_TERMINATOR.len());

            match found {
                Some(end) => (end - previous_len, Some(end)),
                None => (chunk.len(), None),
            }
        };

        reader.consume(copied);

        if let Some(end) = terminator_end {
            block.truncate(end);
            if block.len() > max_len {
                return Err(ProxyError::MalformedRequest(format!(
                    "header block exceeds {} bytes",
                    max_len
                )));
            }
            return Ok(Bytes::from(block));
        }

        if block.len() > max_len {
            return Err(ProxyError::MalformedRequest(format!(
                "header block exceeds {} bytes",
                max_len
            )));
        }
    }
}

/// A parsed HTTP/1.x request head
///
/// Header order and duplicate names are preserved verbatim; the raw
/// captured block is kept alongside so the forwarder can send exactly
/// the bytes the client sent.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    raw: Bytes,
}

impl ParsedRequest {
    /// Parse a captured header block
    pub fn parse(raw: Bytes) -> Result<Self> {
        let text = String::from_utf8_lossy(&raw);
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or("");
        let mut tokens = request_line.split(' ');
        let method = tokens
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProxyError::MalformedRequest("empty request line".to_string()))?
            .to_string();
        let target = tokens
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ProxyError::MalformedRequest(format!("request line has no target: {request_line:?}"))
            })?
            .to_string();
        let version = tokens.next().unwrap_or("").to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                ProxyError::MalformedRequest(format!("header line has no colon: {line:?}"))
            })?;
            headers.push((name.to_string(), value.trim_start().to_string()));
        }

        Ok(Self {
            method,
            target,
            version,
            headers,
            raw,
        })
    }

    /// The captured header block, byte-identical to what the client sent
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// First `Host` header value, matched case-insensitively
    pub fn host(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("host"))
            .map(|(_, value)| value.as_str())
    }

    /// Declared request body length, if any
    pub fn content_length(&self) -> Result<Option<u64>> {
        match self
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        {
            None => Ok(None),
            Some((_, value)) => value.trim().parse::<u64>().map(Some).map_err(|_| {
                ProxyError::MalformedRequest(format!("invalid Content-Length: {value:?}"))
            }),
        }
    }
}
