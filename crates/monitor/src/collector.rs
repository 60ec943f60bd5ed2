//! NVML-based GPU sampling.
//!
//! NVML initialisation is optional: without NVIDIA drivers the collector
//! logs once and reports `None`, which callers treat as "no GPU info".

use nvml_wrapper::enum_wrappers::device::TemperatureSensor;
use nvml_wrapper::Nvml;
use zenith_core::resources::GpuSample;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Wraps NVML and samples every visible GPU.
pub struct GpuCollector {
    /// `None` when NVML could not be initialised.
    nvml: Option<Nvml>,
}

impl Default for GpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GpuCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCollector")
            .field("available", &self.is_available())
            .finish()
    }
}

impl GpuCollector {
    /// Attempt to initialise NVML.
    pub fn new() -> Self {
        let nvml = match Nvml::init() {
            Ok(nvml) => {
                tracing::info!("NVML initialised, GPU sampling enabled");
                Some(nvml)
            }
            Err(e) => {
                tracing::warn!(error = %e, "NVML unavailable, GPU info will be omitted");
                None
            }
        };
        Self { nvml }
    }

    /// A collector that never reports GPUs.
    pub fn disabled() -> Self {
        Self { nvml: None }
    }

    pub fn is_available(&self) -> bool {
        self.nvml.is_some()
    }

    /// Sample every GPU. `None` when NVML is unavailable or the device
    /// count cannot be read; individual failing devices are skipped.
    ///
    /// NVML calls block, so async callers should run this on a blocking
    /// thread.
    pub fn collect(&self) -> Option<Vec<GpuSample>> {
        let nvml = self.nvml.as_ref()?;

        let device_count = match nvml.device_count() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query GPU device count");
                return None;
            }
        };

        let mut samples = Vec::with_capacity(device_count as usize);
        for idx in 0..device_count {
            match collect_device(nvml, idx) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    tracing::warn!(gpu_index = idx, error = %e, "Skipping GPU, sampling failed");
                }
            }
        }
        Some(samples)
    }
}

fn collect_device(nvml: &Nvml, idx: u32) -> Result<GpuSample, nvml_wrapper::error::NvmlError> {
    let device = nvml.device_by_index(idx)?;

    let memory = device.memory_info()?;
    let utilization = device.utilization_rates()?;
    let temperature = device.temperature(TemperatureSensor::Gpu).ok();
    let name = device.name().unwrap_or_else(|_| format!("GPU {idx}"));

    Ok(GpuSample {
        index: idx,
        name,
        usage_percent: utilization.gpu as f32,
        memory_used_mb: memory.used / BYTES_PER_MB,
        memory_total_mb: memory.total / BYTES_PER_MB,
        temperature_celsius: temperature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_collector_reports_no_gpu_info() {
        let collector = GpuCollector::disabled();
        assert!(!collector.is_available());
        assert!(collector.collect().is_none());
    }
}
