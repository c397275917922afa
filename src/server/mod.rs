//! Managed HTTP server
//!
//! [`ManagedServer`] hosts a [`Handler`](crate::http::Handler) behind an
//! accept loop and a stop watcher that coordinate through a single-slot
//! stop channel and a lifecycle watch.

pub mod config;
mod connection;
pub mod managed;

#[cfg(test)]
mod tests;

pub use config::{GRACEFUL_SHUTDOWN_TIMEOUT, ServerConfig};
pub use managed::{ManagedServer, ServerState};
