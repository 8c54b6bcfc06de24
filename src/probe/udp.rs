//! UDP probe implementation.

use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use super::ProbeError;

/// How long to wait for a reply after the probe datagram is sent.
pub const UDP_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Note recorded when the peer stays silent.
pub const UDP_SILENT_NOTE: &str = "UDP port is open (no response received, which is normal)";

const PROBE_PAYLOAD: &[u8] = b"ping";

/// Send a datagram to `host:port` and wait briefly for a reply.
///
/// A read timeout counts as success and yields [`UDP_SILENT_NOTE`]; a reply
/// yields an empty note. Resolve, send and other read errors fail.
pub async fn run_udp_probe(
    host: &str,
    port: u16,
    timeout: Duration,
    read_timeout: Duration,
) -> Result<String, ProbeError> {
    let addr = tokio::time::timeout(timeout, lookup_host((host, port)))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(|e| ProbeError::Network(format!("UDP resolve failed: {}", e)))?
        .next()
        .ok_or_else(|| ProbeError::Network(format!("UDP resolve failed: no address for {}", host)))?;

    let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind)
        .await
        .map_err(|e| ProbeError::Network(format!("UDP connection failed: {}", e)))?;
    socket
        .connect(addr)
        .await
        .map_err(|e| ProbeError::Network(format!("UDP connection failed: {}", e)))?;

    tokio::time::timeout(timeout, socket.send(PROBE_PAYLOAD))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(|e| ProbeError::Network(format!("UDP write failed: {}", e)))?;

    let mut buf = [0u8; 1024];
    match tokio::time::timeout(read_timeout, socket.recv(&mut buf)).await {
        Err(_) => Ok(UDP_SILENT_NOTE.to_string()),
        Ok(Ok(_)) => Ok(String::new()),
        Ok(Err(e)) => Err(ProbeError::Network(format!("UDP read failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_probe_with_echo_reply() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, from) = peer.recv_from(&mut buf).await.unwrap();
            peer.send_to(&buf[..n], from).await.unwrap();
        });

        let note = run_udp_probe("127.0.0.1", port, Duration::from_secs(2), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(note.is_empty());
    }

    #[tokio::test]
    async fn test_udp_probe_silent_peer() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();

        let note = run_udp_probe("127.0.0.1", port, Duration::from_secs(2), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(note, UDP_SILENT_NOTE);
    }

    #[tokio::test]
    async fn test_udp_probe_closed_port_is_down() {
        let port = {
            let closed = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            closed.local_addr().unwrap().port()
        };

        // Loopback answers with ICMP port unreachable, seen as a refused recv.
        let result = run_udp_probe("127.0.0.1", port, Duration::from_secs(2), Duration::from_secs(2)).await;
        match result {
            Err(ProbeError::Network(msg)) => assert!(msg.starts_with("UDP read failed"), "{}", msg),
            other => panic!("expected a read error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_udp_probe_unresolvable_host() {
        let result = run_udp_probe("host.invalid", 53, Duration::from_secs(2), Duration::from_millis(100)).await;
        assert!(result.is_err());
    }
}
