//! Bounded per-endpoint check logs and the statistics derived from them.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use super::models::{CheckRecord, ServiceStatus};
use super::{read_lock, write_lock, StoreError};

/// Records kept per endpoint unless configured otherwise.
pub const DEFAULT_MAX_CHECKS: usize = 100;

/// Check log of a single endpoint, oldest record first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryLog {
    pub service_id: String,
    pub checks: VecDeque<CheckRecord>,
    pub max_checks: usize,
}

impl HistoryLog {
    pub fn new(service_id: impl Into<String>, max_checks: usize) -> Self {
        Self {
            service_id: service_id.into(),
            checks: VecDeque::new(),
            max_checks: if max_checks == 0 { DEFAULT_MAX_CHECKS } else { max_checks },
        }
    }

    /// Append a record, evicting from the front once the bound is exceeded.
    pub fn push(&mut self, record: CheckRecord) {
        self.checks.push_back(record);
        self.truncate();
    }

    fn truncate(&mut self) {
        while self.checks.len() > self.max_checks {
            self.checks.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Compute statistics relative to `now`.
    pub fn statistics_at(&self, now: DateTime<Utc>) -> Statistics {
        let mut stats = Statistics::empty(&self.service_id);
        if self.is_empty() {
            return stats;
        }
        stats.total_checks = self.len();
        let last = &self.checks[self.len() - 1];

        let mut up_response_total: u64 = 0;
        for record in &self.checks {
            match record.status {
                ServiceStatus::Up => {
                    stats.up_count += 1;
                    up_response_total += record.response_time;
                }
                ServiceStatus::Down => stats.down_count += 1,
                ServiceStatus::Unknown => {}
            }
        }

        if stats.up_count > 0 {
            stats.uptime_percentage = stats.up_count as f64 / stats.total_checks as f64 * 100.0;
            stats.average_response_time = up_response_total / stats.up_count as u64;
        }

        // Each gap between consecutive records belongs to the earlier record's status.
        for (prev, next) in self.checks.iter().zip(self.checks.iter().skip(1)) {
            let gap = (next.timestamp - prev.timestamp).num_seconds().max(0);
            match prev.status {
                ServiceStatus::Up => stats.total_uptime += gap,
                ServiceStatus::Down => stats.total_downtime += gap,
                ServiceStatus::Unknown => {}
            }
        }

        let streak_start = self
            .checks
            .iter()
            .rev()
            .take_while(|record| record.status == last.status)
            .last()
            .map(|record| record.timestamp)
            .unwrap_or(last.timestamp);
        let streak = (now - streak_start).num_seconds().max(0);
        match last.status {
            ServiceStatus::Up => stats.current_uptime = streak,
            ServiceStatus::Down => stats.current_downtime = streak,
            ServiceStatus::Unknown => {}
        }

        let day_ago = now - ChronoDuration::hours(24);
        stats.last_24_hours = self
            .checks
            .iter()
            .filter(|record| record.timestamp > day_ago)
            .cloned()
            .collect();

        stats
    }
}

/// Aggregates computed on demand from a [`HistoryLog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub service_id: String,
    pub total_checks: usize,
    pub up_count: usize,
    pub down_count: usize,
    pub uptime_percentage: f64,
    /// Milliseconds, averaged over up checks only.
    pub average_response_time: u64,
    /// Seconds.
    pub current_uptime: i64,
    pub current_downtime: i64,
    pub total_uptime: i64,
    pub total_downtime: i64,
    pub last_24_hours: Vec<CheckRecord>,
}

impl Statistics {
    fn empty(service_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            total_checks: 0,
            up_count: 0,
            down_count: 0,
            uptime_percentage: 0.0,
            average_response_time: 0,
            current_uptime: 0,
            current_downtime: 0,
            total_uptime: 0,
            total_downtime: 0,
            last_24_hours: Vec::new(),
        }
    }
}

/// Concurrent map of endpoint ID to its check log.
pub struct HistoryStore {
    histories: RwLock<HashMap<String, HistoryLog>>,
    max_checks: usize,
}

impl HistoryStore {
    pub fn new(max_checks: usize) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            max_checks: if max_checks == 0 { DEFAULT_MAX_CHECKS } else { max_checks },
        }
    }

    pub fn max_checks(&self) -> usize {
        self.max_checks
    }

    /// Append a record, creating the log on the first check.
    pub fn add_check_record(&self, service_id: &str, record: CheckRecord) {
        let mut histories = write_lock(&self.histories);
        histories
            .entry(service_id.to_string())
            .or_insert_with(|| HistoryLog::new(service_id, self.max_checks))
            .push(record);
    }

    pub fn get(&self, service_id: &str) -> Result<HistoryLog, StoreError> {
        read_lock(&self.histories)
            .get(service_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(service_id.to_string()))
    }

    /// Statistics for an endpoint; zeroed when it has never been checked.
    pub fn statistics(&self, service_id: &str) -> Statistics {
        self.statistics_at(service_id, Utc::now())
    }

    pub fn statistics_at(&self, service_id: &str, now: DateTime<Utc>) -> Statistics {
        match read_lock(&self.histories).get(service_id) {
            Some(history) => history.statistics_at(now),
            None => Statistics::empty(service_id),
        }
    }

    pub fn delete(&self, service_id: &str) -> Result<(), StoreError> {
        write_lock(&self.histories)
            .remove(service_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(service_id.to_string()))
    }

    pub fn export(&self) -> HashMap<String, HistoryLog> {
        read_lock(&self.histories).clone()
    }

    /// Replace all logs, re-applying this store's bound to each.
    pub fn import(&self, histories: HashMap<String, HistoryLog>) {
        let histories = histories
            .into_iter()
            .map(|(id, mut log)| {
                log.service_id = id.clone();
                log.max_checks = self.max_checks;
                log.truncate();
                (id, log)
            })
            .collect();
        *write_lock(&self.histories) = histories;
    }
}
