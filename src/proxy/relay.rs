//! Bidirectional byte relay
//!
//! Copies bytes between two connections in both directions until each
//! source reaches end-of-stream. The two directions run as independent
//! tasks; the owner waits for both, and a failure in either direction
//! tears the other down so neither socket lingers half-open.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Fixed copy chunk size (8 KiB)
pub const CHUNK_SIZE: usize = 8192;

/// Relay bytes between `client` and `upstream` until both directions finish.
///
/// Returns `(client_to_upstream, upstream_to_client)` byte counts.
/// Per-direction I/O errors are steady-state peer disconnects, logged
/// at debug rather than surfaced; any such failure aborts the paired
/// direction so both connections are released promptly.
pub async fn relay<C, U>(client: C, upstream: U) -> (u64, u64)
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);

    let mut send = tokio::spawn(copy_until_eof(client_read, upstream_write));
    let mut recv = tokio::spawn(copy_until_eof(upstream_read, client_write));

    let (sent, received);
    tokio::select! {
        first = &mut send => {
            let sent_bytes = finish("client to upstream", first);
            if sent_bytes.is_none() {
                recv.abort();
            }
            sent = sent_bytes.unwrap_or(0);
            received = finish("upstream to client", recv.await).unwrap_or(0);
        }
        first = &mut recv => {
            let received_bytes = finish("upstream to client", first);
            if received_bytes.is_none() {
                send.abort();
            }
            received = received_bytes.unwrap_or(0);
            sent = finish("client to upstream", send.await).unwrap_or(0);
        }
    }

    debug!(
        bytes_sent = sent,
        bytes_received = received,
        "Relay closed"
    );

    (sent, received)
}

/// Copy fixed-size chunks from `reader` to `writer` until EOF.
///
/// On clean EOF the writer's side is shut down so the far peer sees the
/// stream end. An error returns without shutdown; the owning task
/// aborts the paired direction, and dropping both halves closes the
/// sockets.
async fn copy_until_eof<R, W>(mut reader: R, mut writer: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }

    let _ = writer.shutdown().await;
    Ok(total)
}

/// Collapse a finished direction into its byte count.
///
/// `None` means the direction failed (I/O error) or was aborted after
/// the paired direction failed.
fn finish(
    direction: &'static str,
    result: std::result::Result<std::io::Result<u64>, tokio::task::JoinError>,
) -> Option<u64> {
    match result {
        Ok(Ok(n)) => Some(n),
        Ok(Err(e)) => {
            debug!("{} copy ended: {}", direction, e);
            None
        }
        Err(e) => {
            if !e.is_cancelled() {
                debug!("{} relay task failed: {}", direction, e);
            }
            None
        }
    }
}
