use super::codec::{HttpStream, ensure_host};
use crate::{HakoError, Result};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Configuration for [`HttpClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Time allowed for a whole response to arrive
    pub read_timeout: Duration,
    /// Maximum response body size to prevent memory exhaustion
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_response_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Minimal keep-alive HTTP/1.1 client over a single connection
///
/// # Examples
///
/// ```no_run
/// use hako::http::HttpClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let addr = "127.0.0.1:8080".parse()?;
///     let mut client = HttpClient::connect(addr).await?;
///
///     let response = client.post("/echo", "text/plain", "Hello, hako!").await?;
///     assert_eq!(response.body().as_ref(), b"Hello, hako!");
///     Ok(())
/// }
/// ```
pub struct HttpClient {
    stream: HttpStream<TcpStream>,
    authority: String,
    config: ClientConfig,
}

impl HttpClient {
    /// Connect with default configuration
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    pub async fn connect_with_config(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| HakoError::Timeout("Connection timeout".to_string()))??;

        Ok(Self {
            stream: HttpStream::new(stream),
            authority: addr.to_string(),
            config,
        })
    }

    /// Sends `request` and waits for its response
    pub async fn send(&mut self, mut request: Request<Bytes>) -> Result<Response<Bytes>> {
        ensure_host(&mut request, &self.authority);
        let head_only = *request.method() == Method::HEAD;

        self.stream.write_request(&request).await?;
        let response = timeout(
            self.config.read_timeout,
            self.stream.read_response(head_only, self.config.max_response_size),
        )
        .await
        .map_err(|_| HakoError::Timeout("Read timeout".to_string()))??;

        Ok(response)
    }

    pub async fn get(&mut self, path: &str) -> Result<Response<Bytes>> {
        self.send(build_request(Method::GET, path, None, Bytes::new())?).await
    }

    pub async fn post(
        &mut self,
        path: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Response<Bytes>> {
        self.send(build_request(Method::POST, path, Some(content_type), body.into())?)
            .await
    }

    /// Get client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

fn build_request(method: Method, path: &str, content_type: Option<&str>, body: Bytes) -> Result<Request<Bytes>> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    builder
        .body(body)
        .map_err(|e| HakoError::Config(format!("Invalid request: {e}")))
}
