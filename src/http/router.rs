use super::handler::Handler;
use super::middleware::{Middleware, RequestHead};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ALLOW, CONTENT_TYPE};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;

/// Methods the echo endpoints answer to
pub const ALL_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
];

type MethodRoutes = Vec<(Method, Arc<dyn Handler>)>;

/// Exact-path request router
///
/// Unknown paths get `404 Not Found`. A known path requested with a method
/// it was not registered for gets `405 Method Not Allowed` with an `Allow`
/// header, unless method-not-allowed handling is switched off, in which case
/// it is treated as unknown.
///
/// # Examples
///
/// ```
/// use hako::http::Router;
/// use hako::echo::EchoHandler;
/// use std::sync::Arc;
///
/// let mut router = Router::new();
/// router.any("/echo", Arc::new(EchoHandler::default()));
/// assert!(router.has_route("/echo"));
/// ```
pub struct Router {
    routes: HashMap<String, MethodRoutes>,
    middleware: Vec<Arc<dyn Middleware>>,
    handle_method_not_allowed: bool,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Vec::new(),
            handle_method_not_allowed: true,
        }
    }

    pub fn handle_method_not_allowed(mut self, enabled: bool) -> Self {
        self.handle_method_not_allowed = enabled;
        self
    }

    /// Registers `handler` for `path` and each of `methods`
    ///
    /// Registering a method twice for the same path replaces the handler.
    pub fn route(&mut self, path: &str, methods: &[Method], handler: Arc<dyn Handler>) -> &mut Self {
        let routes = self.routes.entry(path.to_string()).or_default();
        for method in methods {
            match routes.iter_mut().find(|(m, _)| m == method) {
                Some(existing) => existing.1 = handler.clone(),
                None => routes.push((method.clone(), handler.clone())),
            }
        }
        self
    }

    /// Registers `handler` for `path` under every method in [`ALL_METHODS`]
    pub fn any(&mut self, path: &str, handler: Arc<dyn Handler>) -> &mut Self {
        self.route(path, &ALL_METHODS, handler)
    }

    /// Adds a middleware that wraps every request, including 404 and 405 answers
    pub fn layer<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn has_route(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    fn resolve(&self, method: &Method, path: &str) -> Result<&Arc<dyn Handler>, Response<Bytes>> {
        let routes = self
            .routes
            .get(path)
            .ok_or_else(|| plain_response(StatusCode::NOT_FOUND, "404 page not found"))?;

        if let Some((_, handler)) = routes.iter().find(|(m, _)| m == method) {
            return Ok(handler);
        }

        if !self.handle_method_not_allowed {
            return Err(plain_response(StatusCode::NOT_FOUND, "404 page not found"));
        }

        let allow = routes
            .iter()
            .map(|(m, _)| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut response = plain_response(StatusCode::METHOD_NOT_ALLOWED, "405 method not allowed");
        if let Ok(value) = HeaderValue::from_str(&allow) {
            response.headers_mut().insert(ALLOW, value);
        }
        Err(response)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for Router {
    async fn handle(&self, mut request: Request<Bytes>) -> Response<Bytes> {
        for middleware in &self.middleware {
            middleware.before(&mut request);
        }
        let head = RequestHead::from(&request);

        let mut response = match self.resolve(request.method(), request.uri().path()) {
            Ok(handler) => handler.handle(request).await,
            Err(response) => response,
        };

        for middleware in self.middleware.iter().rev() {
            middleware.after(&head, &mut response);
        }
        response
    }
}

/// A `text/plain` response with a static body
pub fn plain_response(status: StatusCode, body: &'static str) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(body.as_bytes()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
