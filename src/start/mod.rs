//! The `start` command: wires the echo handler, router, server and signal
//! handling together

mod config;

pub use config::{DEFAULT_PORT, StartConfig, normalize_path};

use crate::echo::EchoHandler;
use crate::http::{RequestId, RequestLogger, Router};
use crate::server::ManagedServer;
use crate::shutdown::{ShutdownCoordinator, Signal, SignalHook};
use crate::{HakoError, Result};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Extra time granted on top of the server's own drain budget
const STOP_SLACK: Duration = Duration::from_secs(1);

/// Builds the router serving `/echo` and the configured echo path
pub fn create_router(config: &StartConfig) -> Router {
    let echo = Arc::new(EchoHandler::new(
        config.verbose,
        config.verbose_headers,
        config.delay,
    ));

    let mut router = Router::new();
    router
        .layer(RequestLogger {
            access_log: config.verbose,
        })
        .layer(RequestId)
        .any("/echo", echo.clone())
        .any(&config.echo_path, echo);
    router
}

/// Builds the server and registers its stop hooks
///
/// SIGTERM, SIGINT and SIGKILL each get their own hook requesting a stop.
pub fn create_server(config: &StartConfig, coordinator: &ShutdownCoordinator) -> Arc<ManagedServer> {
    let server = Arc::new(ManagedServer::new(config.port, create_router(config)));

    for signal in [Signal::Terminate, Signal::Interrupt, Signal::Kill] {
        let server = Arc::clone(&server);
        coordinator.register_hook(SignalHook::new(signal, move || server.stop_async()));
    }

    server
}

/// Creates and starts the server
pub fn start_async(config: &StartConfig, coordinator: &ShutdownCoordinator) -> Result<Arc<ManagedServer>> {
    let server = create_server(config, coordinator);
    server.start_async()?;
    info!(
        port = config.port,
        path = %config.echo_path,
        delay = ?config.delay,
        "Echo server started"
    );
    Ok(server)
}

/// Runs the server until SIGINT or SIGTERM
pub async fn run(config: StartConfig) -> Result<()> {
    run_with(config, Arc::new(ShutdownCoordinator::new())).await
}

/// Runs the server until `coordinator` delivers a signal
pub async fn run_with(config: StartConfig, coordinator: Arc<ShutdownCoordinator>) -> Result<()> {
    let server = start_async(&config, &coordinator)?;
    let listener = coordinator.listen()?;

    info!("Waiting for shutdown signal...");
    let signal = listener.await.map_err(|e| HakoError::Io(io::Error::other(e)))?;

    info!(%signal, "Shutting down");
    server
        .stop_now(server.config().shutdown_timeout + STOP_SLACK)
        .await
}
