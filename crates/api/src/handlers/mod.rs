//! HTTP handlers, one module per resource.

pub mod jobs;
pub mod presets;
pub mod system;
pub mod workflows;
