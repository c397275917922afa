use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;

/// Settings of the `start` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartConfig {
    pub port: u16,
    /// Extra path served next to `/echo`, always starting with `/`
    pub echo_path: String,
    pub verbose: bool,
    pub verbose_headers: bool,
    pub delay: Duration,
    pub json_log: bool,
}

impl Default for StartConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            echo_path: "/".to_string(),
            verbose: false,
            verbose_headers: false,
            delay: Duration::ZERO,
            json_log: false,
        }
    }
}

impl StartConfig {
    /// Builds a config from raw command line values
    ///
    /// A negative delay means no delay.
    pub fn from_args(
        port: u16,
        delay_ms: i32,
        path: &str,
        verbose: bool,
        verbose_headers: bool,
        json_log: bool,
    ) -> Self {
        Self {
            port,
            echo_path: normalize_path(path),
            verbose,
            verbose_headers,
            delay: Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0)),
            json_log,
        }
    }
}

/// Trims surrounding whitespace and makes sure the path starts with `/`
///
/// ```
/// use hako::start::normalize_path;
///
/// assert_eq!(normalize_path(""), "/");
/// assert_eq!(normalize_path(" custom "), "/custom");
/// assert_eq!(normalize_path("/custom"), "/custom");
/// ```
pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
