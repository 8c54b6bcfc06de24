//! Configuration module for upwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "upwatch.db")
    pub db_path: String,
    /// Period of the global check tick in seconds (default: 30)
    pub check_interval_secs: u64,
    /// Maximum number of check records kept per endpoint (default: 100)
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "upwatch.db".to_string(),
            check_interval_secs: 30,
            history_limit: 100,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `UPWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `UPWATCH_DB_PATH`: Database file path (default: "upwatch.db")
    /// - `UPWATCH_CHECK_INTERVAL_SECS`: Scheduler tick (default: 30)
    /// - `UPWATCH_HISTORY_LIMIT`: Records kept per endpoint (default: 100)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "UPWATCH_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("UPWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "UPWATCH_CHECK_INTERVAL_SECS") {
            if secs > 0 {
                cfg.check_interval_secs = secs;
            }
        }

        if let Some(limit) = parse_var::<usize, _>(&lookup, "UPWATCH_HISTORY_LIMIT") {
            if limit > 0 {
                cfg.history_limit = limit;
            }
        }

        cfg
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}
