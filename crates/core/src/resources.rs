//! Host resource samples and overload evaluation.
//!
//! Pure logic. Sampling lives in `zenith-monitor`; the guard in
//! `zenith-studio` wires the two together and applies the fail-open rule.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_CPU_THRESHOLD: f32 = 80.0;
pub const DEFAULT_RAM_THRESHOLD: f32 = 85.0;
pub const DEFAULT_GPU_THRESHOLD: f32 = 90.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One GPU as reported by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSample {
    pub index: u32,
    pub name: String,
    /// Utilisation, 0-100.
    pub usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub temperature_celsius: Option<u32>,
}

/// Point-in-time host sample.
///
/// `gpus` is `None` when GPU sensing is unavailable, which is a supported
/// degraded mode and not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub ram_available_gb: f32,
    pub gpus: Option<Vec<GpuSample>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverloadThresholds {
    pub cpu_percent: f32,
    pub ram_percent: f32,
    pub gpu_percent: f32,
}

impl Default for OverloadThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: DEFAULT_CPU_THRESHOLD,
            ram_percent: DEFAULT_RAM_THRESHOLD,
            gpu_percent: DEFAULT_GPU_THRESHOLD,
        }
    }
}

/// Which metric exceeded its threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum OverloadReason {
    Cpu { value: f32, threshold: f32 },
    Ram { value: f32, threshold: f32 },
    Gpu { index: u32, value: f32, threshold: f32 },
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Every metric of `sample` strictly above its threshold.
pub fn overload_reasons(sample: &ResourceSample, thresholds: &OverloadThresholds) -> Vec<OverloadReason> {
    let mut reasons = Vec::new();

    if sample.cpu_percent > thresholds.cpu_percent {
        reasons.push(OverloadReason::Cpu {
            value: sample.cpu_percent,
            threshold: thresholds.cpu_percent,
        });
    }
    if sample.ram_percent > thresholds.ram_percent {
        reasons.push(OverloadReason::Ram {
            value: sample.ram_percent,
            threshold: thresholds.ram_percent,
        });
    }
    for gpu in sample.gpus.iter().flatten() {
        if gpu.usage_percent > thresholds.gpu_percent {
            reasons.push(OverloadReason::Gpu {
                index: gpu.index,
                value: gpu.usage_percent,
                threshold: thresholds.gpu_percent,
            });
        }
    }

    reasons
}

/// True when any metric is strictly above its threshold.
pub fn is_overloaded(sample: &ResourceSample, thresholds: &OverloadThresholds) -> bool {
    !overload_reasons(sample, thresholds).is_empty()
}
