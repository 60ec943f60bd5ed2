//! Host resource sensors.
//!
//! CPU and memory come from procfs, GPUs from NVML. Either source may be
//! missing; GPU absence degrades to `gpus: None` and procfs absence is a
//! [`MonitorError`] the guard treats as "not overloaded".

pub mod collector;
pub mod error;
pub mod host;
pub mod sampler;

pub use error::MonitorError;
pub use sampler::{HostMonitor, ResourceSampler};
