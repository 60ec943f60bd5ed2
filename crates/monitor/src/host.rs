//! CPU and memory sampling from procfs.
//!
//! CPU usage is the busy share of ticks since the previous sample (or since
//! boot on the first one). Memory usage is `1 - MemAvailable / MemTotal`.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::MonitorError;

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;

/// Aggregate CPU tick counters from the `cpu ` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub total_ticks: u64,
    /// `idle + iowait`.
    pub idle_ticks: u64,
}

/// Memory figures from `/proc/meminfo`, in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kib: u64,
    pub available_kib: u64,
}

impl MemInfo {
    pub fn used_percent(&self) -> f32 {
        if self.total_kib == 0 {
            return 0.0;
        }
        let used = self.total_kib.saturating_sub(self.available_kib);
        ((used as f64 / self.total_kib as f64) * 100.0).clamp(0.0, 100.0) as f32
    }

    pub fn available_gb(&self) -> f32 {
        (self.available_kib as f64 / KIB_PER_GIB) as f32
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse the aggregate `cpu` line of `/proc/stat`.
pub fn parse_proc_stat_cpu_line(line: &str) -> Option<CpuTimes> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }

    let ticks: Vec<u64> = fields
        .map(str::parse::<u64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    if ticks.len() < 4 {
        return None;
    }

    let idle_ticks = ticks[3].saturating_add(ticks.get(4).copied().unwrap_or(0));
    let total_ticks: u64 = ticks.iter().sum();
    if total_ticks == 0 {
        return None;
    }

    Some(CpuTimes {
        total_ticks,
        idle_ticks,
    })
}

/// Parse `MemTotal` and `MemAvailable` out of `/proc/meminfo`.
pub fn parse_meminfo(contents: &str) -> Option<MemInfo> {
    let field = |key: &str| {
        contents.lines().find_map(|line| {
            let rest = line.strip_prefix(key)?;
            rest.trim().strip_suffix("kB")?.trim().parse::<u64>().ok()
        })
    };

    Some(MemInfo {
        total_kib: field("MemTotal:")?,
        available_kib: field("MemAvailable:")?,
    })
}

/// Busy share of the ticks elapsed between two samples.
pub fn cpu_percent_between(previous: CpuTimes, current: CpuTimes) -> Option<f32> {
    let total_delta = current.total_ticks.saturating_sub(previous.total_ticks);
    if total_delta == 0 {
        return None;
    }
    let idle_delta = current.idle_ticks.saturating_sub(previous.idle_ticks);
    let busy_delta = total_delta.saturating_sub(idle_delta);
    Some(((busy_delta as f64 / total_delta as f64) * 100.0).clamp(0.0, 100.0) as f32)
}

/// Busy share of all ticks since boot.
pub fn cpu_percent_since_boot(times: CpuTimes) -> f32 {
    if times.total_ticks == 0 {
        return 0.0;
    }
    let busy = times.total_ticks.saturating_sub(times.idle_ticks);
    ((busy as f64 / times.total_ticks as f64) * 100.0).clamp(0.0, 100.0) as f32
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// Reads procfs and remembers the previous CPU counters.
#[derive(Debug)]
pub struct HostSampler {
    proc_root: PathBuf,
    previous_cpu: Mutex<Option<CpuTimes>>,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Read `stat` and `meminfo` from another directory.
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            previous_cpu: Mutex::new(None),
        }
    }

    pub async fn cpu_percent(&self) -> Result<f32, MonitorError> {
        let contents = read(&self.proc_root.join("stat")).await?;
        let current = contents
            .lines()
            .find(|line| line.starts_with("cpu "))
            .and_then(parse_proc_stat_cpu_line)
            .ok_or_else(|| MonitorError::Parse("no aggregate cpu line in stat".into()))?;

        let mut previous = self.previous_cpu.lock().await;
        let percent = previous
            .and_then(|prev| cpu_percent_between(prev, current))
            .unwrap_or_else(|| cpu_percent_since_boot(current));
        *previous = Some(current);
        Ok(percent)
    }

    pub async fn memory(&self) -> Result<MemInfo, MonitorError> {
        let contents = read(&self.proc_root.join("meminfo")).await?;
        parse_meminfo(&contents)
            .ok_or_else(|| MonitorError::Parse("MemTotal/MemAvailable missing from meminfo".into()))
    }
}

async fn read(path: &Path) -> Result<String, MonitorError> {
    if !cfg!(target_os = "linux") && path.starts_with("/proc") {
        return Err(MonitorError::Unsupported("procfs sampling requires Linux"));
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| MonitorError::Io {
            path: path.to_path_buf(),
            source,
        })
}
