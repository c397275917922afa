use super::managed::is_transient;
use super::{ManagedServer, ServerConfig, ServerState};
use crate::HakoError;
use crate::echo::EchoHandler;
use crate::http::{Handler, HttpClient};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONNECTION;
use http::{Request, Response, StatusCode};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Notify;

/// Answers after `delay`, signalling `started` first
struct SlowHandler {
    delay: Duration,
    started: Arc<Notify>,
}

#[async_trait]
impl Handler for SlowHandler {
    async fn handle(&self, _request: Request<Bytes>) -> Response<Bytes> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        Response::new(Bytes::from_static(b"done"))
    }
}

fn local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn echo_server() -> ManagedServer {
    ManagedServer::with_addr(local(), EchoHandler::default(), ServerConfig::default())
}

fn slow_server(delay: Duration, config: ServerConfig) -> (ManagedServer, Arc<Notify>) {
    let started = Arc::new(Notify::new());
    let handler = SlowHandler {
        delay,
        started: started.clone(),
    };
    (ManagedServer::with_addr(local(), handler, config), started)
}

#[tokio::test]
async fn test_accepts_connections_right_after_start() {
    let server = echo_server();
    assert_eq!(server.state(), ServerState::Created);
    assert!(server.local_addr().is_none());

    let addr = server.start_async().unwrap();
    assert_eq!(server.state(), ServerState::Running);
    assert_eq!(server.local_addr(), Some(addr));
    assert_ne!(addr.port(), 0);

    let mut client = HttpClient::connect(addr).await.unwrap();
    let response = client.post("/echo", "text/plain", "hello").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"hello");

    server.stop_now(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_port_constructor_binds_all_interfaces() {
    let port = crate::utils::random_free_port().unwrap();
    let server = ManagedServer::new(port, EchoHandler::default());
    assert_eq!(server.addr().port(), port);
    assert!(server.addr().ip().is_unspecified());

    server.start_async().unwrap();
    let stream = TcpStream::connect(("127.0.0.1", port)).await;
    assert!(stream.is_ok());

    server.stop_now(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_refuses_connections_after_stop() {
    let server = echo_server();
    let addr = server.start_async().unwrap();

    server.stop_now(Duration::from_secs(5)).await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);

    let error = TcpStream::connect(addr).await.unwrap_err();
    assert_eq!(error.kind(), io::ErrorKind::ConnectionRefused);
}

#[tokio::test]
async fn test_keep_alive_serves_several_requests() {
    let server = echo_server();
    let addr = server.start_async().unwrap();

    let mut client = HttpClient::connect(addr).await.unwrap();
    for body in ["one", "two", "three"] {
        let response = client.post("/echo", "text/plain", body).await.unwrap();
        assert_eq!(response.body().as_ref(), body.as_bytes());
        assert!(response.headers().get(CONNECTION).is_none());
    }

    server.stop_now(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_repeated_stop_requests_do_not_block() {
    let server = echo_server();
    server.start_async().unwrap();

    server.stop_async();
    server.stop_async();
    server.stop_async();

    server.stop_now(Duration::from_secs(5)).await.unwrap();
    // Stopping a stopped server reports the same outcome
    server.stop_now(Duration::from_secs(1)).await.unwrap();
    server.stop_async();
}

#[tokio::test]
async fn test_stop_before_start_is_kept() {
    let server = echo_server();
    server.stop_async();
    assert_eq!(server.state(), ServerState::Created);

    server.start_async().unwrap();

    let mut state = server.subscribe_state();
    let reached = tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.is_terminal()))
        .await
        .unwrap()
        .map(|s| *s)
        .unwrap();
    assert_eq!(reached, ServerState::Stopped);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let server = echo_server();
    let addr = server.start_async().unwrap();

    let error = server.start_async().unwrap_err();
    assert!(matches!(error, HakoError::AlreadyStarted));
    assert_eq!(server.local_addr(), Some(addr));

    server.stop_now(Duration::from_secs(5)).await.unwrap();
    assert!(matches!(server.start_async(), Err(HakoError::AlreadyStarted)));
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let first = echo_server();
    let addr = first.start_async().unwrap();

    let second = ManagedServer::with_addr(addr, EchoHandler::default(), ServerConfig::default());
    let error = second.start_async().unwrap_err();
    assert!(matches!(error, HakoError::Bind { .. }));
    assert!(error.to_string().starts_with(&format!("failed to bind {addr}")));
    assert_eq!(second.state(), ServerState::Created);

    first.stop_now(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_in_flight_request_completes_during_stop() {
    let (server, started) = slow_server(Duration::from_millis(200), ServerConfig::default());
    let server = Arc::new(server);
    let addr = server.start_async().unwrap();

    let request = tokio::spawn(async move {
        let mut client = HttpClient::connect(addr).await.unwrap();
        client.get("/slow").await.unwrap()
    });
    started.notified().await;

    server.stop_now(Duration::from_secs(5)).await.unwrap();

    let response = request.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), b"done");
    assert_eq!(response.headers()[CONNECTION], "close");
}

#[tokio::test]
async fn test_idle_connections_do_not_hold_up_stop() {
    let server = echo_server();
    let addr = server.start_async().unwrap();

    let mut client = HttpClient::connect(addr).await.unwrap();
    client.get("/echo").await.unwrap();
    let mut idle = TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(1), server.stop_now(Duration::from_secs(5)))
        .await
        .unwrap()
        .unwrap();

    // Both connections were closed by the server
    let mut buf = [0u8; 16];
    assert_eq!(idle.read(&mut buf).await.unwrap_or(0), 0);
    assert!(client.get("/echo").await.is_err());
}

#[tokio::test]
async fn test_drain_timeout_reports_stop_failed() {
    let config = ServerConfig {
        shutdown_timeout: Duration::from_millis(100),
        ..Default::default()
    };
    let (server, started) = slow_server(Duration::from_secs(10), config);
    let addr = server.start_async().unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /hang HTTP/1.1\r\nHost: test\r\n\r\n")
        .await
        .unwrap();
    started.notified().await;

    let error = server.stop_now(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(error, HakoError::StopFailed));
    assert_eq!(error.to_string(), "failed to stop server");
    assert_eq!(server.state(), ServerState::StopFailed);
}

#[tokio::test]
async fn test_caller_timeout_shorter_than_drain() {
    let (server, started) = slow_server(Duration::from_millis(500), ServerConfig::default());
    let addr = server.start_async().unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /slow HTTP/1.1\r\nHost: test\r\n\r\n")
        .await
        .unwrap();
    started.notified().await;

    let error = server.stop_now(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(error, HakoError::StopTimeout));
    assert_eq!(error.to_string(), "timeout waiting for server to stop");
    assert_eq!(server.state(), ServerState::Stopping);

    // The drain still finishes inside the server's own budget
    server.stop_now(Duration::from_secs(5)).await.unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_state_transitions() {
    let server = echo_server();
    let mut states = server.subscribe_state();
    assert_eq!(*states.borrow_and_update(), ServerState::Created);

    server.start_async().unwrap();
    assert_eq!(*states.borrow_and_update(), ServerState::Running);

    server.stop_async();
    let last = tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| s.is_terminal()))
        .await
        .unwrap()
        .map(|s| *s)
        .unwrap();
    assert_eq!(last, ServerState::Stopped);
    assert!(!ServerState::Stopping.is_terminal());
    assert!(ServerState::StopFailed.is_terminal());
}

#[tokio::test]
async fn test_malformed_request_gets_400_and_close() {
    let server = echo_server();
    let addr = server.start_async().unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"NOT A REQUEST\r\n\r\n").await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{response}");
    assert!(response.contains("Connection: close\r\n"));

    server.stop_now(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_failed_bind_leaves_server_startable() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = blocker.local_addr().unwrap();
    let server = ManagedServer::with_addr(addr, EchoHandler::default(), ServerConfig::default());

    server.stop_async();
    assert!(matches!(server.start_async(), Err(HakoError::Bind { .. })));
    assert_eq!(server.state(), ServerState::Created);

    drop(blocker);
    assert_eq!(server.start_async().unwrap(), addr);

    // The stop requested before the failed attempt still applies
    let mut state = server.subscribe_state();
    let reached = tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.is_terminal()))
        .await
        .unwrap()
        .map(|s| *s)
        .unwrap();
    assert_eq!(reached, ServerState::Stopped);
}

#[cfg(unix)]
#[test]
fn test_accept_error_classification() {
    let transient = [
        io::Error::from(io::ErrorKind::ConnectionAborted),
        io::Error::from(io::ErrorKind::ConnectionReset),
        io::Error::from(io::ErrorKind::Interrupted),
        io::Error::from_raw_os_error(libc::ECONNABORTED),
        io::Error::from_raw_os_error(libc::EMFILE),
        io::Error::from_raw_os_error(libc::ENFILE),
        io::Error::from_raw_os_error(libc::ENOBUFS),
        io::Error::from_raw_os_error(libc::ENOMEM),
    ];
    for error in &transient {
        assert!(is_transient(error), "{error} should be retried");
    }

    let fatal = [
        io::Error::from(io::ErrorKind::PermissionDenied),
        io::Error::from(io::ErrorKind::InvalidInput),
        io::Error::from_raw_os_error(libc::EINVAL),
        io::Error::from_raw_os_error(libc::EBADF),
        io::Error::other("listener gone"),
    ];
    for error in &fatal {
        assert!(!is_transient(error), "{error} should be fatal");
    }
}
