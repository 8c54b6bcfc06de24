//! Host resource sampling and threshold alerts.

mod alerts;

pub use alerts::*;

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use sysinfo::{Disks, System};

/// Point-in-time view of the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostSnapshot {
    pub hostname: String,
    pub os: String,
    /// Seconds since boot.
    pub uptime: u64,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disks: Vec<DiskInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuInfo {
    pub cores: usize,
    pub usage_percent: f64,
}

/// Byte counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryInfo {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskInfo {
    pub device: String,
    pub mountpoint: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
}

/// Source of host resource numbers.
pub trait HostSampler: Send + Sync {
    fn sample(&self) -> HostSnapshot;
}

/// [`HostSampler`] backed by `sysinfo`.
///
/// CPU usage is measured between consecutive samples, so the first call
/// after start-up may report zero.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler for SysinfoSampler {
    fn sample(&self) -> HostSnapshot {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu();
        system.refresh_memory();

        let total = system.total_memory();
        let available = system.available_memory();
        let used = total.saturating_sub(available);

        let disks = Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                let free = disk.available_space();
                let used = total.saturating_sub(free);
                DiskInfo {
                    device: disk.name().to_string_lossy().into_owned(),
                    mountpoint: disk.mount_point().to_string_lossy().into_owned(),
                    total,
                    used,
                    free,
                    used_percent: percent(used, total),
                }
            })
            .collect();

        HostSnapshot {
            hostname: System::host_name().unwrap_or_default(),
            os: System::long_os_version().unwrap_or_default(),
            uptime: System::uptime(),
            cpu: CpuInfo {
                cores: system.cpus().len(),
                usage_percent: system.global_cpu_info().cpu_usage() as f64,
            },
            memory: MemoryInfo {
                total,
                used,
                available,
                used_percent: percent(used, total),
            },
            disks,
        }
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
