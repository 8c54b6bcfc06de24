//! Endpoint and check-record model types.

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::time::Duration;

use crate::notify::NotificationOverride;

/// Check interval assigned when a request leaves it unset.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
/// Timeout assigned when a request leaves it unset.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Current availability of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Unknown => write!(f, "unknown"),
            ServiceStatus::Up => write!(f, "up"),
            ServiceStatus::Down => write!(f, "down"),
        }
    }
}

/// What to probe. The protocol and its address travel together so an HTTP
/// check can never be missing its URL.
///
/// A missing or empty `check_type` reads as `http`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "check_type", rename_all = "lowercase")]
pub enum CheckTarget {
    Http { url: String },
    Tcp { host: String, port: u16 },
    Udp { host: String, port: u16 },
}

#[derive(Deserialize)]
struct RawTarget {
    #[serde(default)]
    check_type: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

const CHECK_TYPES: &[&str] = &["http", "tcp", "udp"];

impl<'de> Deserialize<'de> for CheckTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let RawTarget {
            check_type,
            url,
            host,
            port,
        } = RawTarget::deserialize(deserializer)?;
        let missing = |field: &'static str| <D::Error as de::Error>::missing_field(field);

        match check_type.as_deref() {
            None | Some("") | Some("http") => Ok(CheckTarget::Http {
                url: url.ok_or_else(|| missing("url"))?,
            }),
            Some(kind @ ("tcp" | "udp")) => {
                let host = host.ok_or_else(|| missing("host"))?;
                let port = port.ok_or_else(|| missing("port"))?;
                Ok(if kind == "tcp" {
                    CheckTarget::Tcp { host, port }
                } else {
                    CheckTarget::Udp { host, port }
                })
            }
            Some(other) => Err(<D::Error as de::Error>::unknown_variant(other, CHECK_TYPES)),
        }
    }
}

impl fmt::Display for CheckTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckTarget::Http { url } => write!(f, "{}", url),
            CheckTarget::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            CheckTarget::Udp { host, port } => write!(f, "udp://{}:{}", host, port),
        }
    }
}

/// Peer certificate details recorded for HTTPS endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub expires_at: DateTime<Utc>,
    pub issuer: String,
    pub days_left: i64,
    #[serde(default)]
    pub alert_sent: bool,
}

/// The user-editable part of an endpoint, as received on create and edit.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointSpec {
    pub name: String,
    #[serde(flatten)]
    pub target: CheckTarget,
    #[serde(default)]
    pub check_interval: u64,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub notifications: NotificationOverride,
}

/// A monitored endpoint and its latest check state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredEndpoint {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub target: CheckTarget,
    /// Seconds between checks.
    pub check_interval: u64,
    /// Seconds before a check is abandoned.
    pub timeout: u64,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_uptime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_downtime: Option<DateTime<Utc>>,
    /// Latency of the last check in milliseconds.
    #[serde(default)]
    pub response_time: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateInfo>,
    #[serde(default)]
    pub notifications: NotificationOverride,
}

impl MonitoredEndpoint {
    /// Build a fresh endpoint in the unknown state.
    pub fn new(id: String, spec: EndpointSpec, created_at: DateTime<Utc>) -> Self {
        let mut endpoint = Self {
            id,
            name: String::new(),
            target: spec.target.clone(),
            check_interval: 0,
            timeout: 0,
            status: ServiceStatus::Unknown,
            last_check: None,
            last_uptime: None,
            last_downtime: None,
            response_time: 0,
            error_message: String::new(),
            created_at,
            certificate: None,
            notifications: NotificationOverride::default(),
        };
        endpoint.apply_edit(spec);
        endpoint
    }

    /// Replace the user-editable fields, leaving identity and check state alone.
    pub fn apply_edit(&mut self, spec: EndpointSpec) {
        if spec.target != self.target {
            self.certificate = None;
        }
        self.name = spec.name;
        self.target = spec.target;
        self.check_interval = if spec.check_interval == 0 {
            DEFAULT_CHECK_INTERVAL_SECS
        } else {
            spec.check_interval
        };
        self.timeout = if spec.timeout == 0 {
            DEFAULT_TIMEOUT_SECS
        } else {
            spec.timeout
        };
        self.notifications = spec.notifications;
    }

    pub fn timeout_duration(&self) -> Duration {
        match self.timeout {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

/// One entry in an endpoint's check log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub timestamp: DateTime<Utc>,
    pub status: ServiceStatus,
    /// Milliseconds.
    pub response_time: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}
