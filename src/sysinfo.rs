//! CPU temperature and memory usage.
//!
//! Memory comes from `sysinfo`. Temperature comes from the configured thermal
//! zone file when it is readable, otherwise from the hottest CPU sensor
//! `sysinfo` can see.

use crate::config::{Config, seconds};
use crate::error::FetchError;
use crate::producer::{PollSettings, Producer, Source};
use crate::summary::Reading;
use ::sysinfo::{Components, System};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Producer publishing [`SystemStats`].
pub type StatsProvider = Producer<SystemStatsSource>;

/// Placeholder for any figure that could not be read.
pub const NOT_AVAILABLE: &str = "N/A";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Memory in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub used_mb: u64,
    pub total_mb: u64,
}

impl MemoryUsage {
    /// From byte counts as `sysinfo` reports them.
    pub fn from_bytes(used: u64, total: u64) -> Self {
        Self {
            used_mb: used / BYTES_PER_MB,
            total_mb: total / BYTES_PER_MB,
        }
    }

    pub fn percent(&self) -> u64 {
        if self.total_mb == 0 {
            0
        } else {
            (self.used_mb * 100 + self.total_mb / 2) / self.total_mb
        }
    }
}

/// One sample; each figure degrades independently.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SystemStats {
    pub cpu_temp_c: Option<f64>,
    pub memory: Option<MemoryUsage>,
}

impl SystemStats {
    /// e.g. `48.2°C`
    pub fn cpu_text(&self) -> String {
        self.cpu_temp_c
            .map(|t| format!("{t:.1}°C"))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }

    /// e.g. `512/3906 MB (13%)`
    pub fn memory_text(&self) -> String {
        self.memory
            .map(|m| format!("{}/{} MB ({}%)", m.used_mb, m.total_mb, m.percent()))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// Stats from a reading, falling back to all-unavailable.
pub fn stats_or_default(reading: &Reading<SystemStats>) -> SystemStats {
    reading.ready().copied().unwrap_or_default()
}

/// Samples memory and CPU temperature.
#[derive(Debug, Clone)]
pub struct SystemStatsSource {
    system: Arc<Mutex<System>>,
}

impl SystemStatsSource {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SystemStatsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for SystemStatsSource {
    type Output = SystemStats;

    fn name(&self) -> &'static str {
        "system"
    }

    fn settings(&self, config: &Config) -> PollSettings {
        PollSettings {
            enabled: true,
            refresh: seconds(config.system.refresh_s),
        }
    }

    async fn fetch(&self, config: &Config) -> Result<SystemStats, FetchError> {
        let zone_temp = match config.system.thermal_zone.as_os_str().is_empty() {
            true => None,
            false => read_zone_temp(&config.system.thermal_zone)
                .await
                .inspect_err(|e| debug!("Thermal zone unusable, asking sensors: {}", e))
                .ok(),
        };

        // Both sysinfo refreshes read procfs/sysfs synchronously.
        let system = Arc::clone(&self.system);
        let (memory, sensor_temp) = tokio::task::spawn_blocking(move || {
            let memory = sample_memory(&system);
            let sensor_temp = match zone_temp {
                Some(_) => None,
                None => hottest_cpu_sensor(),
            };
            (memory, sensor_temp)
        })
        .await
        .map_err(|e| FetchError::Parse(format!("system sampler: {e}")))?;

        Ok(SystemStats {
            cpu_temp_c: zone_temp.or(sensor_temp),
            memory,
        })
    }
}

fn sample_memory(system: &Mutex<System>) -> Option<MemoryUsage> {
    let mut system = system.lock().unwrap_or_else(PoisonError::into_inner);
    system.refresh_memory();
    let total = system.total_memory();
    (total > 0).then(|| MemoryUsage::from_bytes(system.used_memory(), total))
}

/// Highest temperature among components labelled as CPU or core sensors.
fn hottest_cpu_sensor() -> Option<f64> {
    let components = Components::new_with_refreshed_list();
    components
        .list()
        .iter()
        .filter(|c| {
            let label = c.label().to_lowercase();
            label.contains("cpu") || label.contains("core") || label.contains("soc")
        })
        .filter_map(|c| c.temperature())
        .filter(|t| t.is_finite())
        .map(f64::from)
        .reduce(f64::max)
}

/// Thermal zones report millidegrees Celsius.
async fn read_zone_temp(path: &Path) -> Result<f64, FetchError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FetchError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_millidegrees(&raw).ok_or_else(|| FetchError::Parse(path.display().to_string()))
}

fn parse_millidegrees(raw: &str) -> Option<f64> {
    raw.trim().parse::<i64>().ok().map(|m| m as f64 / 1000.0)
}

/// `HH:MM:SS`, hours unbounded.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
