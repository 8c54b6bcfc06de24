//! HTTP probe implementation.

use std::time::Duration;
use super::ProbeError;

/// Add `http://` when the address carries no scheme.
pub fn normalize_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Run an HTTP GET against `address`.
///
/// Succeeds when the response status is in `200..400`. The body is not read.
pub async fn run_http_probe(address: &str, timeout: Duration) -> Result<(), ProbeError> {
    let url = normalize_url(address);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProbeError::Config(e.to_string()))?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Network(e.to_string())
            }
        })?;

    let status = response.status().as_u16();
    if (200..400).contains(&status) {
        Ok(())
    } else {
        Err(ProbeError::Http(status))
    }
}
