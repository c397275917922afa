use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use std::sync::Arc;

/// Turns a fully buffered request into a response
///
/// Handlers cannot fail: anything that goes wrong is expressed as a response
/// status, and I/O problems belong to the connection layer.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        (**self).handle(request).await
    }
}
