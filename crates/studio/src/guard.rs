//! Resource guard.
//!
//! Answers "is the host too busy to start another generation?" and "is
//! anything still generating?". A failed sample never blocks the user:
//! the host is then reported as not overloaded.

use std::sync::Arc;

use serde::Serialize;
use zenith_core::resources::{overload_reasons, OverloadReason, OverloadThresholds, ResourceSample};
use zenith_monitor::{MonitorError, ResourceSampler};

use crate::queue::JobQueue;

/// Snapshot served to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct GuardStatus {
    /// `None` when sampling failed.
    pub sample: Option<ResourceSample>,
    pub thresholds: OverloadThresholds,
    pub overloaded: bool,
    pub reasons: Vec<OverloadReason>,
}

#[derive(Clone)]
pub struct ResourceGuard {
    sampler: Arc<dyn ResourceSampler>,
    thresholds: OverloadThresholds,
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl ResourceGuard {
    pub fn new(sampler: Arc<dyn ResourceSampler>, thresholds: OverloadThresholds) -> Self {
        Self { sampler, thresholds }
    }

    pub fn thresholds(&self) -> &OverloadThresholds {
        &self.thresholds
    }

    pub async fn sample_resources(&self) -> Result<ResourceSample, MonitorError> {
        self.sampler.sample().await
    }

    /// Overload check against the configured thresholds.
    pub async fn is_overloaded(&self) -> bool {
        self.is_overloaded_with(&self.thresholds).await
    }

    /// Overload check against explicit thresholds. Sampling errors are
    /// logged and count as not overloaded.
    pub async fn is_overloaded_with(&self, thresholds: &OverloadThresholds) -> bool {
        match self.sampler.sample().await {
            Ok(sample) => {
                let reasons = overload_reasons(&sample, thresholds);
                if !reasons.is_empty() {
                    tracing::info!(?reasons, "Host overloaded");
                }
                !reasons.is_empty()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Resource sampling failed, assuming host is not overloaded");
                false
            }
        }
    }

    pub async fn status(&self) -> GuardStatus {
        match self.sampler.sample().await {
            Ok(sample) => {
                let reasons = overload_reasons(&sample, &self.thresholds);
                GuardStatus {
                    overloaded: !reasons.is_empty(),
                    reasons,
                    sample: Some(sample),
                    thresholds: self.thresholds,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Resource sampling failed");
                GuardStatus {
                    sample: None,
                    thresholds: self.thresholds,
                    overloaded: false,
                    reasons: Vec::new(),
                }
            }
        }
    }
}

/// Any job queued or running.
pub fn has_active_jobs(queue: &JobQueue) -> bool {
    queue.has_active_jobs()
}
