//! SQLite database store implementation.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use super::models::Snapshot;
use crate::store::{HistoryLog, MonitoredEndpoint};

const NOTIFICATION_KEY: &str = "notification";
const SYSTEM_ALERTS_KEY: &str = "system_alerts";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Thread-safe snapshot database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Open the database, moving an unreadable file aside first.
    ///
    /// The bad file is renamed to `<path>.corrupt-<unix_ts>` and a fresh
    /// database is created in its place.
    pub fn open_or_recover<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        match Self::new(path) {
            Ok(db) => Ok(db),
            Err(e) if path.exists() => {
                let aside = format!("{}.corrupt-{}", path.display(), Utc::now().timestamp());
                tracing::error!("Failed to open database {}: {}; moving it to {}", path.display(), e, aside);
                std::fs::rename(path, &aside)?;
                Self::new(path)
            }
            Err(e) => Err(e),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn();
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    /// Read the full persisted state. Missing settings fall back to defaults.
    pub fn load(&self) -> Result<Snapshot, DbError> {
        let conn = self.conn();

        let services = {
            let mut stmt = conn.prepare("SELECT id, body FROM endpoints")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<SqlResult<Vec<_>>>()?;
            rows.into_iter()
                .map(|(id, body)| -> Result<_, DbError> {
                    Ok((id, serde_json::from_str::<MonitoredEndpoint>(&body)?))
                })
                .collect::<Result<HashMap<_, _>, DbError>>()?
        };

        let histories = {
            let mut stmt = conn.prepare("SELECT endpoint_id, body FROM histories")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<SqlResult<Vec<_>>>()?;
            rows.into_iter()
                .map(|(id, body)| -> Result<_, DbError> {
                    Ok((id, serde_json::from_str::<HistoryLog>(&body)?))
                })
                .collect::<Result<HashMap<_, _>, DbError>>()?
        };

        Ok(Snapshot {
            services,
            histories,
            notification: load_setting(&conn, NOTIFICATION_KEY)?.unwrap_or_default(),
            alerts: load_setting(&conn, SYSTEM_ALERTS_KEY)?.unwrap_or_default(),
        })
    }

    /// Replace the persisted state with `snapshot` in one transaction.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), DbError> {
        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM endpoints", [])?;
        tx.execute("DELETE FROM histories", [])?;

        {
            let mut stmt =
                tx.prepare("INSERT INTO endpoints (id, created_at, body) VALUES (?1, ?2, ?3)")?;
            for (id, endpoint) in &snapshot.services {
                stmt.execute(params![
                    id,
                    endpoint.created_at.to_rfc3339(),
                    serde_json::to_string(endpoint)?,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare("INSERT INTO histories (endpoint_id, body) VALUES (?1, ?2)")?;
            for (id, history) in &snapshot.histories {
                stmt.execute(params![id, serde_json::to_string(history)?])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO settings (key, body) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET body=excluded.body",
            )?;
            stmt.execute(params![NOTIFICATION_KEY, serde_json::to_string(&snapshot.notification)?])?;
            stmt.execute(params![SYSTEM_ALERTS_KEY, serde_json::to_string(&snapshot.alerts)?])?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn load_setting<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>, DbError> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM settings WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;

    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}
