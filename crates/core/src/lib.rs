//! Pure domain logic for Zenith Studio.
//!
//! Nothing in this crate performs network or filesystem I/O. The job state
//! machine, workflow graph editing, missing-model validation and overload
//! evaluation all live here so they can be tested in isolation.

pub mod catalog;
pub mod error;
pub mod job;
pub mod preset;
pub mod resources;
pub mod types;
pub mod validation;
pub mod workflow;
