//! Proxy server: accept loop, admission control, per-connection dispatch
//!
//! Accepts connections until a shutdown signal is observed and hands
//! each one to a worker task drawn from a bounded pool. Saturation is
//! an explicit rejection, never unbounded growth; a single connection's
//! failure never disturbs the accept loop or other connections.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ProxyServerConfig;
use crate::error::{ProxyError, Result};
use crate::proxy::forward;
use crate::proxy::request::{read_header_block, ParsedRequest};
use crate::proxy::router::Route;
use crate::proxy::tunnel;

/// Proxy server
pub struct ProxyServer {
    config: ProxyServerConfig,
    workers: Arc<Semaphore>,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: ProxyServerConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_connections));
        Self { config, workers }
    }

    /// Bind the configured address and serve until shutdown
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Proxy server listening on {}", addr);
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already-bound listener.
    ///
    /// Split from `run` so tests can bind port 0 and learn the address.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            self.dispatch(stream, client_addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Proxy server shutting down");
                        break;
                    }
                }
            }
        }

        // Stop accepting, then wait for in-flight connections to drain.
        drop(listener);
        let _drain = self
            .workers
            .acquire_many(self.config.max_connections as u32)
            .await;
        info!("Proxy server stopped");

        Ok(())
    }

    /// Admit a connection into the worker pool, or reject it
    fn dispatch(&self, stream: TcpStream, client_addr: SocketAddr) {
        let permit = match self.workers.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(client = %client_addr, "Worker pool saturated, rejecting connection");
                drop(stream);
                return;
            }
        };

        let config = self.config.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = handle_connection(stream, client_addr, &config).await {
                if e.is_client_error() {
                    debug!(client = %client_addr, "Connection rejected: {}", e);
                } else {
                    warn!(client = %client_addr, "Connection failed: {}", e);
                }
            }
        });
    }
}

/// Handle one accepted connection end to end
#[instrument(skip(stream, config), fields(client = %client_addr))]
async fn handle_connection(
    stream: TcpStream,
    client_addr: SocketAddr,
    config: &ProxyServerConfig,
) -> Result<()> {
    // Buffer the whole stream: the header scan must not eat bytes the
    // body or tunnel needs.
    let mut conn = BufReader::new(stream);

    let outcome = async {
        let raw = read_header_block(&mut conn, config.max_header_bytes).await?;
        let request = ParsedRequest::parse(raw)?;
        debug!(method = %request.method, target = %request.target, "Request parsed");
        let route = Route::resolve(&request)?;
        Ok::<_, ProxyError>((request, route))
    }
    .await;

    let (request, route) = match outcome {
        Ok(parsed) => parsed,
        Err(e) => {
            // Parsing/routing errors are terminal: tell the client when
            // the error kind warrants it, then close.
            if let Some((status, body)) = e.client_response() {
                let _ = write_error_response(&mut conn, status, body).await;
            }
            return Err(e);
        }
    };

    match route {
        Route::Tunnel { .. } => {
            let addr = route.addr();
            match tunnel::establish(conn, &addr, config.dial_timeout()).await {
                Ok((sent, received)) => {
                    debug!(
                        upstream = %addr,
                        bytes_sent = sent,
                        bytes_received = received,
                        "Tunnel session finished"
                    );
                    Ok(())
                }
                // Policy: a failed CONNECT dial closes the client
                // connection without a response.
                Err(e) => Err(e),
            }
        }
        Route::Forward { .. } => {
            let addr = route.addr();
            match forward::forward(&mut conn, &request, &addr, config.dial_timeout()).await {
                Ok(_) => Ok(()),
                Err(e @ ProxyError::UpstreamUnreachable(_)) => {
                    let _ =
                        write_error_response(&mut conn, "502 Bad Gateway", "Upstream unreachable")
                            .await;
                    Err(e)
                }
                Err(e) => {
                    if let Some((status, body)) = e.client_response() {
                        let _ = write_error_response(&mut conn, status, body).await;
                    }
                    Err(e)
                }
            }
        }
    }
}

/// Write a minimal raw HTTP error response before closing
async fn write_error_response<W>(writer: &mut W, status: &str, body: &str) -> std::io::Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    writer.shutdown().await
}
