//! Helpers for tests and benches that run real servers

use crate::{HakoError, Result};
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::time::Duration;
use tokio::net::TcpStream;

/// Asks the OS for a port that is free right now
///
/// The port is released before returning, so another process may take it
/// in between. Good enough for tests.
pub fn random_free_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .map_err(|e| HakoError::Config(format!("Failed to bind probe listener: {e}")))?;
    Ok(listener.local_addr()?.port())
}

/// Polls `addr` until it accepts a connection, up to `attempts` times
pub async fn await_port(addr: SocketAddr, attempts: usize) -> Result<()> {
    for _ in 0..attempts {
        if TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(HakoError::Timeout(format!("{addr} not accepting connections")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_free_port_is_bindable() {
        let port = random_free_port().unwrap();
        assert_ne!(port, 0);
        assert!(TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok());
    }

    #[tokio::test]
    async fn test_await_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        await_port(addr, 3).await.unwrap();

        drop(listener);
        let error = await_port(addr, 2).await.unwrap_err();
        assert!(matches!(error, HakoError::Timeout(_)));
    }
}
