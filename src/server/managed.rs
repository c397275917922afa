use super::config::ServerConfig;
use super::connection::serve_connection;
use crate::http::Handler;
use crate::{HakoError, Result};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, warn};

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Lifecycle of a [`ManagedServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Running,
    Stopping,
    /// All connections drained inside the shutdown timeout
    Stopped,
    /// The shutdown timeout elapsed with connections still open
    StopFailed,
}

impl ServerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ServerState::Stopped | ServerState::StopFailed)
    }
}

/// An HTTP server with asynchronous start and stop
///
/// The server is single-use: start it once, stop it once. Starting spawns
/// an accept loop and a stop watcher. Stopping is split between
/// [`stop_async`](Self::stop_async), which only requests a stop and never
/// blocks, and [`stop_now`](Self::stop_now), which also waits for the watcher
/// to report the outcome.
///
/// The watcher gives in-flight requests [`ServerConfig::shutdown_timeout`]
/// (3 seconds by default) to finish. That budget is independent of the
/// timeout passed to `stop_now`: with a shorter caller timeout `stop_now`
/// can report a timeout while the server still stops cleanly afterwards.
///
/// # Examples
///
/// ```no_run
/// use hako::server::ManagedServer;
/// use hako::echo::EchoHandler;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = ManagedServer::new(8080, EchoHandler::default());
///     let addr = server.start_async()?;
///     println!("listening on {addr}");
///
///     server.stop_now(Duration::from_secs(5)).await?;
///     Ok(())
/// }
/// ```
pub struct ManagedServer {
    addr: SocketAddr,
    handler: Arc<dyn Handler>,
    config: ServerConfig,
    stop_tx: mpsc::Sender<()>,
    stop_rx: Mutex<Option<mpsc::Receiver<()>>>,
    state: Arc<watch::Sender<ServerState>>,
    local_addr: OnceLock<SocketAddr>,
}

impl ManagedServer {
    /// Creates a server for `0.0.0.0:port`; nothing is bound until started
    pub fn new<H: Handler>(port: u16, handler: H) -> Self {
        Self::with_config(port, handler, ServerConfig::default())
    }

    pub fn with_config<H: Handler>(port: u16, handler: H, config: ServerConfig) -> Self {
        Self::with_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), handler, config)
    }

    pub fn with_addr<H: Handler>(addr: SocketAddr, handler: H, config: ServerConfig) -> Self {
        // A single slot: one pending stop request at most
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(ServerState::Created);

        Self {
            addr,
            handler: Arc::new(handler),
            config,
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
            state: Arc::new(state),
            local_addr: OnceLock::new(),
        }
    }

    /// Binds the listener and spawns the accept loop and the stop watcher
    ///
    /// The socket is bound before this returns, so connecting right after a
    /// successful start does not race the accept loop. Returns the bound
    /// address, which differs from the configured one when port 0 was asked
    /// for. Must be called from within a Tokio runtime.
    ///
    /// Once running, an accept failure that is not transient terminates the
    /// process.
    pub fn start_async(&self) -> Result<SocketAddr> {
        let mut slot = self.stop_rx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(stop_rx) = slot.take() else {
            return Err(HakoError::AlreadyStarted);
        };

        info!(address = %self.addr, "Starting HTTP server");
        let (listener, local_addr) = match bind(self.addr) {
            Ok(bound) => bound,
            Err(e) => {
                // Still startable: keep the receiver and any stop request it holds
                *slot = Some(stop_rx);
                return Err(e);
            }
        };
        let _ = self.local_addr.set(local_addr);
        self.state.send_replace(ServerState::Running);

        let shutdown = CancellationToken::new();
        let connections = TaskTracker::new();

        let accept_loop = tokio::spawn(accept_loop(
            listener,
            self.handler.clone(),
            self.config.clone(),
            shutdown.clone(),
            connections.clone(),
        ));
        tokio::spawn(stop_watcher(
            stop_rx,
            accept_loop,
            shutdown,
            connections,
            self.config.shutdown_timeout,
            self.state.clone(),
        ));

        info!(address = %local_addr, "HTTP server listening");
        Ok(local_addr)
    }

    /// Requests a stop and returns immediately
    ///
    /// A request made while another one is still pending is dropped, as is
    /// one made after the server stopped. A request made before the server
    /// was started is kept and acted on as soon as it starts.
    pub fn stop_async(&self) {
        match self.stop_tx.try_send(()) {
            Ok(()) => debug!("Stop requested"),
            Err(TrySendError::Full(())) => debug!("Stop already pending"),
            Err(TrySendError::Closed(())) => debug!("Server already stopped"),
        }
    }

    /// Requests a stop and waits up to `timeout` for the outcome
    pub async fn stop_now(&self, timeout: Duration) -> Result<()> {
        self.stop_async();

        let mut state = self.state.subscribe();
        match tokio::time::timeout(timeout, state.wait_for(|s| s.is_terminal())).await {
            Ok(Ok(current)) if *current == ServerState::Stopped => Ok(()),
            Ok(_) => Err(HakoError::StopFailed),
            Err(_) => Err(HakoError::StopTimeout),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watches lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// The configured address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The bound address, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

impl fmt::Debug for ManagedServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedServer")
            .field("addr", &self.addr)
            .field("local_addr", &self.local_addr())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn bind(addr: SocketAddr) -> Result<(TcpListener, SocketAddr)> {
    let bind_error = |source| HakoError::Bind { addr, source };

    let listener = std::net::TcpListener::bind(addr).map_err(bind_error)?;
    listener.set_nonblocking(true).map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;
    Ok((TcpListener::from_std(listener).map_err(bind_error)?, local_addr))
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn Handler>,
    config: ServerConfig,
    shutdown: CancellationToken,
    connections: TaskTracker,
) {
    let mut backoff = MIN_ACCEPT_BACKOFF;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                backoff = MIN_ACCEPT_BACKOFF;
                debug!(%peer, "Accepted connection");
                let span = tracing::debug_span!("connection", %peer);
                connections.spawn(
                    serve_connection(stream, peer, handler.clone(), config.clone(), shutdown.clone())
                        .instrument(span),
                );
            }
            Err(e) if is_transient(&e) => {
                warn!(error = %e, retry_in = ?backoff, "Failed to accept connection");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
            }
            Err(e) => {
                error!(error = %e, "HTTP server failed to accept connections, exiting");
                std::process::exit(1);
            }
        }
    }

    debug!("Accept loop stopped");
}

async fn stop_watcher(
    mut stop_rx: mpsc::Receiver<()>,
    accept_loop: JoinHandle<()>,
    shutdown: CancellationToken,
    connections: TaskTracker,
    shutdown_timeout: Duration,
    state: Arc<watch::Sender<ServerState>>,
) {
    // `None` means every handle to the server was dropped
    let requested = stop_rx.recv().await.is_some();
    info!(requested, "Received stop signal");
    state.send_replace(ServerState::Stopping);

    shutdown.cancel();
    if let Err(e) = accept_loop.await {
        warn!(error = %e, "Accept loop ended abnormally");
    }

    connections.close();
    let outcome = match timeout(shutdown_timeout, connections.wait()).await {
        Ok(()) => {
            info!("HTTP server stopped");
            ServerState::Stopped
        }
        Err(_) => {
            error!(
                open_connections = connections.len(),
                timeout = ?shutdown_timeout,
                "HTTP server shutdown timed out"
            );
            ServerState::StopFailed
        }
    };
    state.send_replace(outcome);
}

/// Whether an accept error is worth retrying after a backoff
pub(super) fn is_transient(error: &io::Error) -> bool {
    if matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }

    #[cfg(unix)]
    if let Some(code) = error.raw_os_error() {
        return matches!(code, libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM);
    }

    false
}
