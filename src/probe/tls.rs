//! Peer certificate inspection for HTTPS endpoints.

use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::{CertificateSnapshot, ProbeError};

/// Read the leaf certificate of an `https` URL.
///
/// Returns `None` for other schemes and on any failure.
pub async fn peer_certificate(url: &str, timeout: Duration) -> Option<CertificateSnapshot> {
    let parsed = reqwest::Url::parse(url).ok()?;
    if parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?.to_string();
    let port = parsed.port_or_known_default().unwrap_or(443);

    tokio::time::timeout(timeout, handshake(&host, port))
        .await
        .ok()?
        .ok()
}

async fn handshake(host: &str, port: u16) -> Result<CertificateSnapshot, ProbeError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| ProbeError::Config(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ProbeError::Config(e.to_string()))?;

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| ProbeError::Network(e.to_string()))?;
    let tls = TlsConnector::from(Arc::new(config))
        .connect(server_name, stream)
        .await
        .map_err(|e| ProbeError::Network(e.to_string()))?;

    let (_, session) = tls.get_ref();
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| ProbeError::Network("no peer certificate".to_string()))?;

    certificate_from_der(leaf.as_ref(), Utc::now())
}

/// Extract expiry and issuer common name from a DER certificate.
pub fn certificate_from_der(der: &[u8], now: DateTime<Utc>) -> Result<CertificateSnapshot, ProbeError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| ProbeError::Network(e.to_string()))?;

    let expires_at = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| ProbeError::Network("certificate expiry out of range".to_string()))?;
    let issuer = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    Ok(CertificateSnapshot {
        expires_at,
        issuer,
        days_left: (expires_at - now).num_days(),
    })
}
