use super::config::ServerConfig;
use crate::http::codec::{self, HttpStream};
use crate::http::{Handler, plain_response};
use http::{Method, Version};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Serves HTTP/1.1 requests on one connection until it closes
///
/// Once `shutdown` fires, a connection waiting for its next request is closed
/// right away, while one in the middle of a request finishes it and answers
/// with `Connection: close`.
pub(crate) async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn Handler>,
    config: ServerConfig,
    shutdown: CancellationToken,
) {
    let mut stream = HttpStream::new(stream);

    loop {
        if !stream.has_buffered() {
            let filled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!(%peer, "Closing idle connection for shutdown");
                    break;
                }
                filled = timeout(config.idle_timeout, stream.fill_buf()) => filled,
            };
            match filled {
                Ok(Ok(0)) => {
                    debug!(%peer, "Client closed connection");
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    debug!(%peer, error = %e, "Failed to read from connection");
                    break;
                }
                Err(_) => {
                    debug!(%peer, "Idle timeout");
                    break;
                }
            }
        }

        let request = match timeout(config.read_timeout, stream.read_request(config.max_body_size)).await {
            Ok(Ok(Some(request))) => request,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                warn!(%peer, error = %e, "Rejecting request");
                if let Some(status) = e.status() {
                    let response = plain_response(status, status.canonical_reason().unwrap_or("bad request"));
                    let _ = timeout(config.write_timeout, stream.write_response(&response, false, false)).await;
                }
                break;
            }
            Err(_) => {
                warn!(%peer, "Read timeout");
                break;
            }
        };

        let head_only = *request.method() == Method::HEAD;
        let client_keep_alive = codec::keep_alive(request.version(), request.headers());

        let response = handler.handle(request).await;

        let keep_alive = client_keep_alive
            && !shutdown.is_cancelled()
            && codec::keep_alive(Version::HTTP_11, response.headers());

        match timeout(config.write_timeout, stream.write_response(&response, head_only, keep_alive)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "Failed to write response");
                break;
            }
            Err(_) => {
                warn!(%peer, "Write timeout");
                break;
            }
        }

        if !keep_alive {
            break;
        }
    }
}
