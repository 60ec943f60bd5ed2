//! Transient user notifications.
//!
//! - [`NotificationBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`Notification`]: a short message about a job or the studio.
//! - [`NotificationLog`]: bounded history of recent notifications, filled
//!   by the [`NotificationLog::record`] background loop.

pub mod bus;
pub mod log;

pub use bus::{Notification, NotificationBus, NotificationLevel};
pub use log::NotificationLog;
