//! Persisted snapshot type.

use std::collections::HashMap;

use crate::notify::NotificationConfig;
use crate::store::{HistoryLog, MonitoredEndpoint};
use crate::system::SystemAlertConfig;

/// Everything that survives a restart.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub services: HashMap<String, MonitoredEndpoint>,
    pub histories: HashMap<String, HistoryLog>,
    pub notification: NotificationConfig,
    pub alerts: SystemAlertConfig,
}
