use crate::http::codec::HttpError;
use std::net::SocketAddr;
use thiserror::Error;

/// Error types for the hako library
#[derive(Error, Debug)]
pub enum HakoError {
    /// The listener could not be bound to the configured address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O errors outside of request handling (signal subscription, client sockets)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP framing errors
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Graceful shutdown did not complete inside the shutdown timeout
    #[error("failed to stop server")]
    StopFailed,

    /// The caller gave up waiting for the stop watcher
    #[error("timeout waiting for server to stop")]
    StopTimeout,

    /// `start_async` was called on a server that was already started
    #[error("server already started")]
    AlreadyStarted,

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for the hako library
pub type Result<T> = std::result::Result<T, HakoError>;

pub mod echo;
pub mod http;
pub mod logging;
pub mod server;
pub mod shutdown;
pub mod start;
pub mod utils;

// Re-export main types for convenience
pub use echo::EchoHandler;
pub use crate::http::{Handler, HttpClient, Router};
pub use server::{ManagedServer, ServerConfig, ServerState};
pub use shutdown::{ShutdownCoordinator, ShutdownHook, Signal, SignalHook, signal_hook};
pub use start::StartConfig;
