use crate::metrics::PredictMetrics;
use crate::uploads::UploadStore;
use inference::{Detect, ImageLimits};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};

pub const SERVICE_NAME: &str = "license-plate-detection-api";
pub const API_VERSION: &str = "2.0.0";

#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn Detect>,
    pub limits: Arc<ImageLimits>,
    pub uploads: UploadStore,
    pub metrics: PredictMetrics,
    pub monitor: Arc<SystemMonitor>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(detector: Arc<dyn Detect>, limits: ImageLimits, uploads: UploadStore) -> Self {
        Self {
            detector,
            limits: Arc::new(limits),
            uploads,
            metrics: PredictMetrics::new("gateway"),
            monitor: Arc::new(SystemMonitor::new()),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemoryUsage {
    pub rss_mb: f64,
    pub vms_mb: f64,
    pub percent: f64,
}

/// Process and host resource readings backed by `sysinfo`.
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| tracing::warn!(error = e, "Cannot resolve current pid"))
            .ok();
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }

    /// Memory held by this process. `Err` carries a displayable reason.
    pub fn memory_usage(&self) -> Result<MemoryUsage, String> {
        let pid = self.pid.ok_or("current process id unavailable")?;
        let mut system = self
            .system
            .lock()
            .map_err(|_| "system monitor lock poisoned".to_string())?;
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let process = system
            .process(pid)
            .ok_or_else(|| format!("process {} not found", pid))?;
        let total = system.total_memory();

        Ok(MemoryUsage {
            rss_mb: round2(bytes_to_mb(process.memory())),
            vms_mb: round2(bytes_to_mb(process.virtual_memory())),
            percent: if total == 0 {
                0.0
            } else {
                round2(process.memory() as f64 / total as f64 * 100.0)
            },
        })
    }

    /// Average utilization across all CPUs since the previous reading.
    pub fn cpu_percent(&self) -> f32 {
        let Ok(mut system) = self.system.lock() else {
            return 0.0;
        };
        system.refresh_cpu_usage();

        let cpus = system.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
