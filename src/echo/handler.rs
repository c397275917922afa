use crate::http::Handler;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName};
use http::{Request, Response, StatusCode};
use std::time::Duration;
use tracing::info;

/// Request header overriding the response status
pub const HAKO_STATUS: HeaderName = HeaderName::from_static("x-hako-status");

/// Echoes request bodies back to the caller
#[derive(Debug, Clone, Default)]
pub struct EchoHandler {
    /// Log request bodies
    pub verbose: bool,
    /// Log request headers
    pub verbose_headers: bool,
    /// Minimum time to hold each request before answering
    pub delay: Duration,
}

impl EchoHandler {
    pub fn new(verbose: bool, verbose_headers: bool, delay: Duration) -> Self {
        Self {
            verbose,
            verbose_headers,
            delay,
        }
    }

    fn log_request(&self, request: &Request<Bytes>) {
        if self.verbose_headers {
            for (name, value) in request.headers() {
                info!(
                    header = %name,
                    value = %String::from_utf8_lossy(value.as_bytes()),
                    "Request header"
                );
            }
        }

        if self.verbose && !request.body().is_empty() {
            let body = String::from_utf8_lossy(request.body());
            info!(body = %body.trim(), "Request body");
        }
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        self.log_request(&request);

        if !self.delay.is_zero() {
            if self.verbose {
                info!(delay = ?self.delay, "Delaying response");
            }
            tokio::time::sleep(self.delay).await;
        }

        let status = status_override(&request).unwrap_or(StatusCode::OK);
        let content_type = request.headers().get(CONTENT_TYPE).cloned();

        let mut response = Response::new(request.into_body());
        *response.status_mut() = status;
        if let Some(content_type) = content_type {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response
    }
}

fn status_override(request: &Request<Bytes>) -> Option<StatusCode> {
    let value = request.headers().get(HAKO_STATUS)?.to_str().ok()?;
    let status = StatusCode::from_bytes(value.trim().as_bytes()).ok()?;
    (!status.is_informational()).then_some(status)
}
