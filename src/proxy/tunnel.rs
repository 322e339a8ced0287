//! CONNECT tunnel establishment
//!
//! Dials the requested destination, confirms the tunnel to the client,
//! and hands both connections to the relay. From that point the proxy
//! stops interpreting bytes entirely.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::error::{ProxyError, Result};
use crate::proxy::relay;

/// Exact confirmation line written to the client once the upstream dial
/// succeeds. Nothing is relayed before it.
pub const ESTABLISHED_RESPONSE: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Dial `addr` within `timeout`, mapping failure to `UpstreamUnreachable`
#[instrument]
pub async fn dial(addr: &str, timeout: Duration) -> Result<TcpStream> {
    debug!("Dialing upstream {}", addr);
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProxyError::UpstreamUnreachable(format!("{}: {}", addr, e))),
        Err(_) => Err(ProxyError::UpstreamUnreachable(format!(
            "{}: connect timed out",
            addr
        ))),
    }
}

/// Establish a CONNECT tunnel and relay until both directions finish.
///
/// A dial failure is returned before anything is written to the client;
/// the caller closes the connection without a response.
pub async fn establish<C>(mut client: C, addr: &str, timeout: Duration) -> Result<(u64, u64)>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let upstream = dial(addr, timeout).await?;

    client.write_all(ESTABLISHED_RESPONSE).await?;
    client.flush().await?;
    debug!("Tunnel established to {}", addr);

    Ok(relay::relay(client, upstream).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Loopback upstream that echoes whatever it receives.
    async fn spawn_echo_upstream() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_establish_sends_literal_before_any_relayed_byte() {
        let upstream_addr = spawn_echo_upstream().await;
        let (client, mut peer) = tokio::io::duplex(4096);

        let tunnel = tokio::spawn(async move {
            establish(
                client,
                &upstream_addr.to_string(),
                Duration::from_secs(5),
            )
            .await
        });

        let mut confirm = vec![0u8; ESTABLISHED_RESPONSE.len()];
        peer.read_exact(&mut confirm).await.unwrap();
        assert_eq!(confirm, ESTABLISHED_RESPONSE);

        peer.write_all(b"opaque bytes").await.unwrap();
        let mut echoed = vec![0u8; 12];
        peer.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"opaque bytes");

        peer.shutdown().await.unwrap();
        let (sent, received) = tunnel.await.unwrap().unwrap();
        assert_eq!(sent, 12);
        assert_eq!(received, 12);
    }

    #[tokio::test]
    async fn test_establish_dial_failure_writes_nothing() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = listener.local_addr().unwrap();
        drop(listener);

        let (client, mut peer) = tokio::io::duplex(4096);
        let err = establish(client, &dead_addr.to_string(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnreachable(_)));

        // The client side sees EOF with no established-line.
        let mut buf = Vec::new();
        peer.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }
}
