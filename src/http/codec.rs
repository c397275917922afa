use bytes::{Buf, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, EXPECT, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri, Version, request, response};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum number of headers accepted in a message head
pub const MAX_HEADERS: usize = 64;
/// Maximum size of a message head (request line plus headers)
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

const MAX_LINE_SIZE: usize = 8 * 1024;
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Incomplete request")]
    IncompleteRequest,
    #[error("Message head exceeds {limit} bytes or has too many headers")]
    HeadTooLarge { limit: usize },
    #[error("Body of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
}

impl HttpError {
    /// Status to answer with before closing the connection, when the peer
    /// can still be told what went wrong
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::HttpParse(_) | HttpError::InvalidRequest(_) => Some(StatusCode::BAD_REQUEST),
            HttpError::HeadTooLarge { .. } => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            HttpError::PayloadTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            HttpError::Io(_) | HttpError::IncompleteRequest => None,
        }
    }
}

/// HTTP/1.1 framing over a byte stream
///
/// Bytes read past the end of one message stay buffered for the next, so a
/// single `HttpStream` serves a whole keep-alive connection.
pub struct HttpStream<S> {
    inner: S,
    buffer: BytesMut,
}

impl<S> HttpStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Whether bytes of a not yet parsed message are buffered
    pub fn has_buffered(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Reads once from the stream into the buffer, returning 0 at EOF
    ///
    /// This method is cancel safe.
    pub async fn fill_buf(&mut self) -> Result<usize, HttpError> {
        if self.buffer.capacity() - self.buffer.len() < READ_CHUNK {
            self.buffer.reserve(READ_CHUNK);
        }
        Ok(self.inner.read_buf(&mut self.buffer).await?)
    }

    /// Reads the next request, or `None` if the peer closed between requests
    pub async fn read_request(&mut self, max_body: usize) -> Result<Option<Request<Bytes>>, HttpError> {
        let (parts, consumed) = loop {
            if let Some(parsed) = parse_request_head(&self.buffer)? {
                break parsed;
            }
            if self.buffer.len() > MAX_HEAD_SIZE {
                return Err(HttpError::HeadTooLarge { limit: MAX_HEAD_SIZE });
            }
            if self.fill_buf().await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(HttpError::IncompleteRequest);
            }
        };
        self.buffer.advance(consumed);

        if expects_continue(&parts) {
            self.inner.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
            self.inner.flush().await?;
        }

        let body = self.read_body(&parts.headers, max_body).await?;
        Ok(Some(Request::from_parts(parts, body)))
    }

    /// Writes `response`, always framed with `Content-Length`
    ///
    /// The body is left out for `HEAD` requests and for statuses that never
    /// carry one (1xx, 204, 304).
    pub async fn write_response(
        &mut self,
        response: &Response<Bytes>,
        head_only: bool,
        keep_alive: bool,
    ) -> Result<(), HttpError> {
        let status = response.status();
        let bodyless = is_bodyless(status);

        let mut head = BytesMut::with_capacity(256);
        head.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );
        write_headers(&mut head, response.headers());
        if !bodyless {
            head.extend_from_slice(format!("Content-Length: {}\r\n", response.body().len()).as_bytes());
        }
        if !keep_alive {
            head.extend_from_slice(b"Connection: close\r\n");
        }
        head.extend_from_slice(b"\r\n");

        self.inner.write_all(&head).await?;
        if !head_only && !bodyless {
            self.inner.write_all(response.body()).await?;
        }
        self.inner.flush().await?;
        Ok(())
    }

    /// Writes `request` with a `Content-Length` body
    pub async fn write_request(&mut self, request: &Request<Bytes>) -> Result<(), HttpError> {
        let target = request
            .uri()
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");

        let mut head = BytesMut::with_capacity(256);
        head.extend_from_slice(format!("{} {} HTTP/1.1\r\n", request.method(), target).as_bytes());
        write_headers(&mut head, request.headers());
        head.extend_from_slice(format!("Content-Length: {}\r\n\r\n", request.body().len()).as_bytes());

        self.inner.write_all(&head).await?;
        self.inner.write_all(request.body()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Reads the response to a request; `head_only` for responses to `HEAD`
    pub async fn read_response(&mut self, head_only: bool, max_body: usize) -> Result<Response<Bytes>, HttpError> {
        let (parts, consumed) = loop {
            if let Some(parsed) = parse_response_head(&self.buffer)? {
                break parsed;
            }
            if self.buffer.len() > MAX_HEAD_SIZE {
                return Err(HttpError::HeadTooLarge { limit: MAX_HEAD_SIZE });
            }
            if self.fill_buf().await? == 0 {
                return Err(HttpError::IncompleteRequest);
            }
        };
        self.buffer.advance(consumed);

        let body = if head_only || is_bodyless(parts.status) {
            Bytes::new()
        } else if parts.headers.contains_key(CONTENT_LENGTH) || is_chunked(&parts.headers) {
            self.read_body(&parts.headers, max_body).await?
        } else {
            self.read_to_end(max_body).await?
        };
        Ok(Response::from_parts(parts, body))
    }

    async fn read_body(&mut self, headers: &HeaderMap, max_body: usize) -> Result<Bytes, HttpError> {
        if is_chunked(headers) {
            return self.read_chunked(max_body).await;
        }

        let length = content_length(headers)?.unwrap_or(0);
        if length > max_body {
            return Err(HttpError::PayloadTooLarge {
                size: length,
                limit: max_body,
            });
        }
        self.read_exact(length).await
    }

    async fn read_chunked(&mut self, max_body: usize) -> Result<Bytes, HttpError> {
        let mut body = BytesMut::new();

        loop {
            let line = self.read_line().await?;
            let size_field = line[..].split(|&b| b == b';').next().unwrap_or_default();
            let size = std::str::from_utf8(size_field)
                .ok()
                .and_then(|s| usize::from_str_radix(s.trim(), 16).ok())
                .ok_or_else(|| HttpError::HttpParse("invalid chunk size".to_string()))?;

            if size == 0 {
                // Trailers are read and dropped
                while !self.read_line().await?.is_empty() {}
                return Ok(body.freeze());
            }

            // `size` comes from the peer and may be near usize::MAX
            if size > max_body.saturating_sub(body.len()) {
                return Err(HttpError::PayloadTooLarge {
                    size: body.len().saturating_add(size),
                    limit: max_body,
                });
            }

            let chunk = self.read_exact(size).await?;
            if self.read_exact(2).await?.as_ref() != b"\r\n" {
                return Err(HttpError::HttpParse("chunk not terminated by CRLF".to_string()));
            }
            body.extend_from_slice(&chunk);
        }
    }

    async fn read_line(&mut self) -> Result<Bytes, HttpError> {
        loop {
            if let Some(pos) = self.buffer.windows(2).position(|w| w == b"\r\n") {
                let line = self.buffer.split_to(pos).freeze();
                self.buffer.advance(2);
                return Ok(line);
            }
            if self.buffer.len() > MAX_LINE_SIZE {
                return Err(HttpError::HttpParse("line too long".to_string()));
            }
            if self.fill_buf().await? == 0 {
                return Err(HttpError::IncompleteRequest);
            }
        }
    }

    async fn read_exact(&mut self, len: usize) -> Result<Bytes, HttpError> {
        if self.buffer.len() < len {
            self.buffer.reserve(len - self.buffer.len());
        }
        while self.buffer.len() < len {
            if self.fill_buf().await? == 0 {
                return Err(HttpError::IncompleteRequest);
            }
        }
        Ok(self.buffer.split_to(len).freeze())
    }

    async fn read_to_end(&mut self, max_body: usize) -> Result<Bytes, HttpError> {
        while self.fill_buf().await? > 0 {
            if self.buffer.len() > max_body {
                return Err(HttpError::PayloadTooLarge {
                    size: self.buffer.len(),
                    limit: max_body,
                });
            }
        }
        Ok(self.buffer.split().freeze())
    }
}

/// Whether the connection should stay open after this exchange
pub fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let tokens = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();

    if tokens.iter().any(|t| t == "close") {
        return false;
    }
    if tokens.iter().any(|t| t == "keep-alive") {
        return true;
    }
    version != Version::HTTP_10 && version != Version::HTTP_09
}

fn parse_request_head(buf: &[u8]) -> Result<Option<(request::Parts, usize)>, HttpError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let consumed = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => {
            return Err(HttpError::HeadTooLarge { limit: MAX_HEAD_SIZE });
        }
        Err(e) => return Err(HttpError::HttpParse(format!("Failed to parse request head: {e}"))),
    };

    let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())
        .map_err(|e| HttpError::InvalidRequest(format!("invalid method: {e}")))?;
    let uri: Uri = req
        .path
        .unwrap_or("/")
        .parse()
        .map_err(|e| HttpError::InvalidRequest(format!("invalid request target: {e}")))?;

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .version(version_of(req.version));
    for header in req.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let (parts, ()) = builder
        .body(())
        .map_err(|e| HttpError::InvalidRequest(e.to_string()))?
        .into_parts();

    Ok(Some((parts, consumed)))
}

fn parse_response_head(buf: &[u8]) -> Result<Option<(response::Parts, usize)>, HttpError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);

    let consumed = match res.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(HttpError::HttpParse(format!("Failed to parse response head: {e}"))),
    };

    let status = StatusCode::from_u16(res.code.unwrap_or_default())
        .map_err(|e| HttpError::HttpParse(format!("invalid status: {e}")))?;

    let mut builder = Response::builder()
        .status(status)
        .version(version_of(res.version));
    for header in res.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let (parts, ()) = builder
        .body(())
        .map_err(|e| HttpError::HttpParse(e.to_string()))?
        .into_parts();

    Ok(Some((parts, consumed)))
}

fn version_of(minor: Option<u8>) -> Version {
    match minor {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    }
}

fn write_headers(head: &mut BytesMut, headers: &HeaderMap) {
    for (name, value) in headers {
        // Framing headers are owned by the codec
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING || name == CONNECTION {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
}

/// Chunked framing applies only when `chunked` is the final transfer coding
fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .last()
        .is_some_and(|coding| coding.eq_ignore_ascii_case("chunked"))
}

/// The declared body length; repeated `Content-Length` values must agree
fn content_length(headers: &HeaderMap) -> Result<Option<usize>, HttpError> {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let fields = value
            .to_str()
            .map_err(|_| HttpError::InvalidRequest("invalid Content-Length".to_string()))?;
        for field in fields.split(',') {
            let parsed = field
                .trim()
                .parse::<usize>()
                .map_err(|_| HttpError::InvalidRequest("invalid Content-Length".to_string()))?;
            match length {
                Some(previous) if previous != parsed => {
                    return Err(HttpError::InvalidRequest("conflicting Content-Length headers".to_string()));
                }
                _ => length = Some(parsed),
            }
        }
    }
    Ok(length)
}

fn is_bodyless(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

fn expects_continue(parts: &request::Parts) -> bool {
    parts.version == Version::HTTP_11
        && parts
            .headers
            .get(EXPECT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("100-continue"))
}

/// Adds a `Host` header derived from `authority` when the request has none
pub(crate) fn ensure_host<B>(request: &mut Request<B>, authority: &str) {
    if !request.headers().contains_key(HOST) {
        if let Ok(value) = http::HeaderValue::from_str(authority) {
            request.headers_mut().insert(HOST, value);
        }
    }
}
