//! ComfyUI REST and WebSocket client library.
//!
//! Provides the HTTP API wrapper, history/queue interpretation, typed
//! WebSocket messages, live progress tracking, the fixed-delay fetch retry
//! and the [`backend::GenerationBackend`] seam the job queue drives.

pub mod api;
pub mod backend;
pub mod client;
pub mod history;
pub mod messages;
pub mod progress;
pub mod retry;
