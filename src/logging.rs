//! Log output setup
//!
//! Logs go to stdout, either as human-readable lines without timestamps or
//! as one JSON object per event. `RUST_LOG` overrides the default filter.

use crate::{HakoError, Result};
use std::io::IsTerminal;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "hako=info";

pub type BoxSubscriber = Box<dyn Subscriber + Send + Sync + 'static>;

/// Builds a subscriber writing to `writer`, without ANSI colors
pub fn subscriber<W>(json: bool, writer: W) -> BoxSubscriber
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    build(json, env_filter(), writer, false)
}

/// Installs the global subscriber
pub fn init(json: bool) -> Result<()> {
    let ansi = std::io::stdout().is_terminal();
    tracing::subscriber::set_global_default(build(json, env_filter(), std::io::stdout, ansi))
        .map_err(|e| HakoError::Config(format!("Failed to install logger: {e}")))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn build<W>(json: bool, filter: EnvFilter, writer: W, ansi: bool) -> BoxSubscriber
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    if json {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        Box::new(builder.without_time().finish())
    }
}
