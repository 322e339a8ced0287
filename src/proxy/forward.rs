//! Plain-HTTP request forwarding
//!
//! Dials the destination, writes the captured header block verbatim,
//! streams any declared request body, then relays the raw response
//! bytes back to the client until the destination closes. No header
//! rewriting happens anywhere on this path; hop-by-hop headers pass
//! through untouched.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::error::{ProxyError, Result};
use crate::proxy::relay::CHUNK_SIZE;
use crate::proxy::request::ParsedRequest;
use crate::proxy::tunnel;

/// Forward a parsed request to `addr` and relay the response back.
///
/// `client` must be the same buffered stream the header block was read
/// from, so body bytes already buffered are not lost.
#[instrument(skip(client, request), fields(method = %request.method, target = %request.target))]
pub async fn forward<C>(
    mut client: C,
    request: &ParsedRequest,
    addr: &str,
    timeout: Duration,
) -> Result<u64>
where
    C: AsyncBufRead + AsyncWrite + Unpin,
{
    let mut upstream = tunnel::dial(addr, timeout).await?;

    // The header block goes out byte-identical to what the client sent,
    // order and duplicates included.
    upstream.write_all(request.raw()).await?;

    if let Some(length) = request_body_length(request)? {
        debug!(length, "Forwarding request body");
        copy_body(&mut client, &mut upstream, length).await?;
    }
    upstream.flush().await?;

    // Response relay: raw bytes back to the client until upstream EOF.
    let received = copy_response(&mut upstream, &mut client).await?;
    let _ = client.shutdown().await;
    debug!(bytes_received = received, "Forward complete");

    Ok(received)
}

/// Body length to forward, if the method carries one
fn request_body_length(request: &ParsedRequest) -> Result<Option<u64>> {
    let carries_body = request.method.eq_ignore_ascii_case("POST")
        || request.method.eq_ignore_ascii_case("PUT");
    if !carries_body {
        return Ok(None);
    }
    Ok(request.content_length()?.filter(|n| *n > 0))
}

/// Copy exactly `length` body bytes from the client to the upstream
async fn copy_body<R, W>(reader: &mut R, writer: &mut W, length: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = length;

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader
            .read(&mut buf[..want])
            .await
            .map_err(|e| ProxyError::BodyReadError(e.to_string()))?;
        if n == 0 {
            return Err(ProxyError::BodyReadError(format!(
                "client closed with {} body bytes outstanding",
                remaining
            )));
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| ProxyError::RelayError(format!("upstream write failed: {}", e)))?;
        remaining -= n as u64;
    }

    Ok(())
}

/// Copy response bytes upstream→client until EOF
async fn copy_response<R, W>(reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| ProxyError::RelayError(format!("upstream read failed: {}", e)))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| ProxyError::RelayError(format!("client write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| ProxyError::RelayError(format!("client flush failed: {}", e)))?;
        total += n as u64;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;

    /// Loopback origin that captures everything it receives and answers
    /// with a canned response once the expected byte count arrives.
    async fn spawn_origin(
        expect: usize,
        response: &'static [u8],
    ) -> (std::net::SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = vec![0u8; expect];
            socket.read_exact(&mut received).await.unwrap();
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.unwrap();
            received
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_forward_sends_header_block_verbatim() {
        let raw: &[u8] = b"GET / HTTP/1.1\r\nHost: example.com\r\nCookie: a=1\r\nCookie: b=2\r\n\r\n";
        let response: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
        let (addr, origin) = spawn_origin(raw.len(), response).await;

        let request = ParsedRequest::parse(Bytes::copy_from_slice(raw)).unwrap();
        let (client, mut peer) = tokio::io::duplex(4096);
        let mut client = BufReader::new(client);

        let received = forward(
            &mut client,
            &request,
            &addr.to_string(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(received, response.len() as u64);

        // The origin saw exactly the bytes the client produced.
        assert_eq!(origin.await.unwrap(), raw);

        // The client got the raw response back unmodified.
        let mut got = Vec::new();
        peer.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, response);
    }

    #[tokio::test]
    async fn test_forward_streams_post_body() {
        let head: &[u8] = b"POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Length: 11\r\n\r\n";
        let body: &[u8] = b"payload=abc";
        let response: &[u8] = b"HTTP/1.1 201 Created\r\n\r\n";
        let (addr, origin) = spawn_origin(head.len() + body.len(), response).await;

        let request = ParsedRequest::parse(Bytes::copy_from_slice(head)).unwrap();
        let (client, mut peer) = tokio::io::duplex(4096);
        let mut client = BufReader::new(client);

        peer.write_all(body).await.unwrap();

        let received = forward(
            &mut client,
            &request,
            &addr.to_string(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(received, response.len() as u64);

        let mut expected = head.to_vec();
        expected.extend_from_slice(body);
        assert_eq!(origin.await.unwrap(), expected);

        let mut got = Vec::new();
        peer.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, response);
    }

    #[tokio::test]
    async fn test_forward_fails_when_client_dies_mid_body() {
        let head: &[u8] = b"PUT /upload HTTP/1.1\r\nHost: example.com\r\nContent-Length: 100\r\n\r\n";
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the socket open; the body never completes.
            let _socket = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let request = ParsedRequest::parse(Bytes::copy_from_slice(head)).unwrap();
        let (client, mut peer) = tokio::io::duplex(4096);
        let mut client = BufReader::new(client);

        peer.write_all(b"only part of it").await.unwrap();
        peer.shutdown().await.unwrap();

        let err = forward(
            &mut client,
            &request,
            &addr.to_string(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProxyError::BodyReadError(_)));
    }

    #[tokio::test]
    async fn test_forward_dial_failure_is_upstream_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = listener.local_addr().unwrap();
        drop(listener);

        let raw: &[u8] = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let request = ParsedRequest::parse(Bytes::copy_from_slice(raw)).unwrap();
        let (client, _peer) = tokio::io::duplex(4096);
        let mut client = BufReader::new(client);

        let err = forward(
            &mut client,
            &request,
            &dead_addr.to_string(),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable(_)));
    }
}
