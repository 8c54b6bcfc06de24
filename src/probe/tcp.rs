//! TCP probe implementation.

use std::time::Duration;
use tokio::net::TcpStream;
use super::ProbeError;

/// Open a TCP connection to `host:port` within `timeout`.
pub async fn run_tcp_probe(host: &str, port: u16, timeout: Duration) -> Result<(), ProbeError> {
    tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(|e| ProbeError::Network(format!("TCP connection failed: {}", e)))?;
    Ok(())
}
