//! Application services for Zenith Studio.
//!
//! Wires the pure domain logic in `zenith-core` to the ComfyUI backend,
//! the host monitor and the filesystem: the job queue, the resource guard,
//! presets, base workflows, the model catalog and artifact copies.

pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod guard;
pub mod presets;
pub mod queue;
pub mod shared;
pub mod workflows;

pub use config::{ConfigError, StudioConfig};
pub use error::StoreError;
pub use guard::ResourceGuard;
pub use queue::{JobQueue, QueueConfig};
pub use shared::SharedQueue;
