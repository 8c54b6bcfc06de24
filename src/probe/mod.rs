//! Probe module for endpoint checks.
//!
//! Supports HTTP(S), TCP and UDP probes. HTTPS endpoints additionally get
//! their peer certificate inspected once the verdict is known.

mod http;
mod tcp;
mod tls;
mod udp;

pub use http::*;
pub use tcp::*;
pub use tls::*;
pub use udp::*;

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::store::{CheckTarget, MonitoredEndpoint, ServiceStatus};

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("HTTP status code: {0}")]
    Http(u16),
}

/// Certificate details read during a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSnapshot {
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub days_left: i64,
}

/// Outcome of one check. Failures are encoded in `status` and
/// `error_message`, never returned as errors.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub endpoint_id: String,
    pub status: ServiceStatus,
    /// Milliseconds.
    pub response_time: u64,
    pub error_message: String,
    pub checked_at: DateTime<Utc>,
    pub certificate: Option<CertificateSnapshot>,
}

/// Something that can check an endpoint.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, endpoint: &MonitoredEndpoint) -> CheckResult;
}

/// Network-backed [`Checker`].
#[derive(Debug, Clone)]
pub struct CheckExecutor {
    udp_read_timeout: Duration,
}

impl CheckExecutor {
    pub fn new() -> Self {
        Self {
            udp_read_timeout: UDP_READ_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_udp_read_timeout(mut self, timeout: Duration) -> Self {
        self.udp_read_timeout = timeout;
        self
    }
}

impl Default for CheckExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Checker for CheckExecutor {
    async fn check(&self, endpoint: &MonitoredEndpoint) -> CheckResult {
        let timeout = endpoint.timeout_duration();
        let checked_at = Utc::now();
        let start = Instant::now();

        let verdict = match &endpoint.target {
            CheckTarget::Http { url } => run_http_probe(url, timeout).await.map(|()| String::new()),
            CheckTarget::Tcp { host, port } => run_tcp_probe(host, *port, timeout).await.map(|()| String::new()),
            CheckTarget::Udp { host, port } => {
                run_udp_probe(host, *port, timeout, self.udp_read_timeout).await
            }
        };

        let response_time = start.elapsed().as_millis() as u64;

        let responded = matches!(verdict, Ok(_) | Err(ProbeError::Http(_)));
        let (status, error_message) = match verdict {
            Ok(note) => (ServiceStatus::Up, note),
            Err(e) => (ServiceStatus::Down, e.to_string()),
        };

        tracing::debug!(
            "Check {} ({}): {} in {}ms",
            endpoint.name,
            endpoint.target,
            status,
            response_time
        );

        let certificate = match &endpoint.target {
            CheckTarget::Http { url } if responded => peer_certificate(url, timeout).await,
            _ => None,
        };

        CheckResult {
            endpoint_id: endpoint.id.clone(),
            status,
            response_time,
            error_message,
            checked_at,
            certificate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EndpointSpec;

    fn endpoint(target: CheckTarget) -> MonitoredEndpoint {
        MonitoredEndpoint::new(
            "probe-test".to_string(),
            EndpointSpec {
                name: "probe".to_string(),
                target,
                check_interval: 0,
                timeout: 2,
                notifications: Default::default(),
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_tcp_check_up_and_down() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let executor = CheckExecutor::new();
        let up = executor
            .check(&endpoint(CheckTarget::Tcp { host: "127.0.0.1".to_string(), port }))
            .await;
        assert_eq!(up.status, ServiceStatus::Up);
        assert_eq!(up.endpoint_id, "probe-test");
        assert!(up.error_message.is_empty());
        assert!(up.certificate.is_none());

        drop(listener);
        let down = executor
            .check(&endpoint(CheckTarget::Tcp { host: "127.0.0.1".to_string(), port }))
            .await;
        assert_eq!(down.status, ServiceStatus::Down);
        assert!(down.error_message.starts_with("TCP connection failed"));
    }

    #[tokio::test]
    async fn test_udp_silent_peer_counts_as_up() {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = peer.local_addr().unwrap().port();

        let executor = CheckExecutor::new().with_udp_read_timeout(Duration::from_millis(200));
        let result = executor
            .check(&endpoint(CheckTarget::Udp { host: "127.0.0.1".to_string(), port }))
            .await;

        assert_eq!(result.status, ServiceStatus::Up);
        assert_eq!(result.error_message, UDP_SILENT_NOTE);
    }

    #[tokio::test]
    async fn test_http_check_records_status() {
        use axum::{http::StatusCode, routing::get, Router};

        let router = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/broken", get(|| async { StatusCode::BAD_GATEWAY }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let executor = CheckExecutor::new();
        let up = executor
            .check(&endpoint(CheckTarget::Http { url: format!("http://{}/ok", addr) }))
            .await;
        assert_eq!(up.status, ServiceStatus::Up);
        assert!(up.certificate.is_none());

        let down = executor
            .check(&endpoint(CheckTarget::Http { url: format!("http://{}/broken", addr) }))
            .await;
        assert_eq!(down.status, ServiceStatus::Down);
        assert_eq!(down.error_message, "HTTP status code: 502");
    }
}
