use bytes::Bytes;
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use tracing::info;
use uuid::Uuid;

/// Request correlation header
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The parts of a request that remain visible after the handler consumed it
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl<B> From<&Request<B>> for RequestHead {
    fn from(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        }
    }
}

/// Runs around every request a [`Router`](super::Router) handles
///
/// `before` hooks run in registration order, `after` hooks in reverse.
pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request<Bytes>) {}

    fn after(&self, _request: &RequestHead, _response: &mut Response<Bytes>) {}
}

/// Makes sure every request carries an `X-Request-ID` and echoes it back
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestId;

impl Middleware for RequestId {
    fn before(&self, request: &mut Request<Bytes>) {
        if request.headers().contains_key(X_REQUEST_ID) {
            return;
        }
        if let Ok(id) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            request.headers_mut().insert(X_REQUEST_ID, id);
        }
    }

    fn after(&self, request: &RequestHead, response: &mut Response<Bytes>) {
        if let Some(id) = request.headers.get(X_REQUEST_ID) {
            response.headers_mut().insert(X_REQUEST_ID, id.clone());
        }
    }
}

/// Logs incoming requests, and their outcome when `access_log` is set
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger {
    pub access_log: bool,
}

impl Middleware for RequestLogger {
    fn before(&self, request: &mut Request<Bytes>) {
        info!(method = %request.method(), uri = %request.uri(), "Handling request");
    }

    fn after(&self, request: &RequestHead, response: &mut Response<Bytes>) {
        if !self.access_log {
            return;
        }
        let request_id = request
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        info!(
            method = %request.method,
            uri = %request.uri,
            status = response.status().as_u16(),
            size = response.body().len(),
            request_id,
            "Request completed"
        );
    }
}
