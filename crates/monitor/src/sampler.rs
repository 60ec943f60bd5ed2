//! The resource sampling seam.

use std::sync::Arc;

use async_trait::async_trait;
use zenith_core::resources::ResourceSample;

use crate::collector::GpuCollector;
use crate::error::MonitorError;
use crate::host::HostSampler;

/// Produces point-in-time host resource samples.
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self) -> Result<ResourceSample, MonitorError>;
}

/// procfs for CPU/RAM plus NVML for GPUs.
#[derive(Debug)]
pub struct HostMonitor {
    host: HostSampler,
    gpus: Arc<GpuCollector>,
}

impl Default for HostMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMonitor {
    pub fn new() -> Self {
        Self::with_parts(HostSampler::new(), GpuCollector::new())
    }

    pub fn with_parts(host: HostSampler, gpus: GpuCollector) -> Self {
        Self {
            host,
            gpus: Arc::new(gpus),
        }
    }
}

#[async_trait]
impl ResourceSampler for HostMonitor {
    async fn sample(&self) -> Result<ResourceSample, MonitorError> {
        let cpu_percent = self.host.cpu_percent().await?;
        let memory = self.host.memory().await?;

        let collector = Arc::clone(&self.gpus);
        let gpus = match tokio::task::spawn_blocking(move || collector.collect()).await {
            Ok(gpus) => gpus,
            Err(e) => {
                tracing::warn!(error = %e, "GPU sampling task failed");
                None
            }
        };

        Ok(ResourceSample {
            cpu_percent,
            ram_percent: memory.used_percent(),
            ram_available_gb: memory.available_gb(),
            gpus,
        })
    }
}
