//! Debounced threshold alerts for CPU, memory and disks.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{HostSampler, HostSnapshot};
use crate::db::SaveHandle;
use crate::notify::{Event, NotificationOverride, NotificationSink};

/// Mount points whose usage can raise alerts.
pub const ALERTABLE_MOUNTS: &[&str] = &["/", "/home"];

/// Thresholds in percent. An alert fires when usage goes above one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemAlertConfig {
    pub disk_space_threshold: f64,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub enabled: bool,
}

impl Default for SystemAlertConfig {
    fn default() -> Self {
        Self {
            disk_space_threshold: 80.0,
            cpu_threshold: 90.0,
            memory_threshold: 90.0,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Disk,
    Cpu,
    Memory,
}

/// A threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceAlert {
    pub kind: ResourceKind,
    /// Mount point, for disk alerts.
    pub device: Option<String>,
    pub current: f64,
    pub threshold: f64,
}

/// Which conditions have already been reported. Each flag is independent;
/// disks are tracked per mount point.
#[derive(Debug, Clone, Default)]
pub struct AlertDebounceState {
    pub cpu: bool,
    pub memory: bool,
    pub disks: HashMap<String, bool>,
}

/// Edge-triggered check: true only when crossing above `threshold` while
/// the flag is clear. The flag clears once usage is back at or below it.
fn crossed(flag: &mut bool, current: f64, threshold: f64) -> bool {
    if current > threshold {
        if *flag {
            false
        } else {
            *flag = true;
            true
        }
    } else {
        *flag = false;
        false
    }
}

/// Applies thresholds to host samples and notifies on new breaches.
pub struct ResourceAlertMonitor {
    config: RwLock<SystemAlertConfig>,
    state: Mutex<AlertDebounceState>,
    notifier: Arc<NotificationSink>,
    sampler: Arc<dyn HostSampler>,
    save: Option<SaveHandle>,
}

impl ResourceAlertMonitor {
    pub fn new(
        config: SystemAlertConfig,
        notifier: Arc<NotificationSink>,
        sampler: Arc<dyn HostSampler>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            state: Mutex::new(AlertDebounceState::default()),
            notifier,
            sampler,
            save: None,
        }
    }

    pub fn with_save_hook(mut self, save: SaveHandle) -> Self {
        self.save = Some(save);
        self
    }

    pub fn config(&self) -> SystemAlertConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_config(&self, config: SystemAlertConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        if let Some(save) = &self.save {
            save.request();
        }
    }

    /// Sample the host, evaluating alerts when they can be delivered.
    pub fn system_info(&self) -> HostSnapshot {
        let snapshot = self.sampler.sample();
        if self.config().enabled && self.notifier.default_route().is_deliverable() {
            self.evaluate(&snapshot);
        }
        snapshot
    }

    /// Update the debounce flags from `snapshot` and notify for each new breach.
    pub fn evaluate(&self, snapshot: &HostSnapshot) -> Vec<ResourceAlert> {
        let config = self.config();
        let mut alerts = Vec::new();

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

            for disk in &snapshot.disks {
                if !ALERTABLE_MOUNTS.contains(&disk.mountpoint.as_str()) {
                    continue;
                }
                let flag = state.disks.entry(disk.mountpoint.clone()).or_default();
                if crossed(flag, disk.used_percent, config.disk_space_threshold) {
                    alerts.push(ResourceAlert {
                        kind: ResourceKind::Disk,
                        device: Some(disk.mountpoint.clone()),
                        current: disk.used_percent,
                        threshold: config.disk_space_threshold,
                    });
                }
            }

            if crossed(&mut state.cpu, snapshot.cpu.usage_percent, config.cpu_threshold) {
                alerts.push(ResourceAlert {
                    kind: ResourceKind::Cpu,
                    device: None,
                    current: snapshot.cpu.usage_percent,
                    threshold: config.cpu_threshold,
                });
            }

            if crossed(&mut state.memory, snapshot.memory.used_percent, config.memory_threshold) {
                alerts.push(ResourceAlert {
                    kind: ResourceKind::Memory,
                    device: None,
                    current: snapshot.memory.used_percent,
                    threshold: config.memory_threshold,
                });
            }
        }

        for alert in &alerts {
            tracing::warn!(
                "Resource threshold exceeded: {:?} {:.1}% > {:.1}%",
                alert.kind,
                alert.current,
                alert.threshold
            );
            self.notifier
                .notify(Event::ResourceThreshold(alert.clone()), &NotificationOverride::default());
        }

        alerts
    }
}
