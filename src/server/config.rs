use std::time::Duration;

/// How long in-flight requests get to finish once a stop is requested
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for [`ManagedServer`](super::ManagedServer)
///
/// # Examples
///
/// ```
/// use hako::server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig {
///     shutdown_timeout: Duration::from_secs(1),
///     ..Default::default()
/// };
/// assert_eq!(config.max_body_size, 10 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Time allowed to receive a request once its first byte arrived
    pub read_timeout: Duration,
    /// Time allowed to write a response
    pub write_timeout: Duration,
    /// Time a keep-alive connection may sit idle between requests
    pub idle_timeout: Duration,
    /// Maximum accepted request body size
    pub max_body_size: usize,
    /// Budget for draining connections during a graceful stop
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            max_body_size: 10 * 1024 * 1024, // 10MB
            shutdown_timeout: GRACEFUL_SHUTDOWN_TIMEOUT,
        }
    }
}
