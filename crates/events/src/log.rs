//! Bounded history of recent notifications.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::bus::{Notification, NotificationLevel};

/// Default number of notifications kept.
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Ring buffer of the most recent notifications. Clones share the buffer.
#[derive(Debug, Clone)]
pub struct NotificationLog {
    entries: Arc<RwLock<VecDeque<Notification>>>,
    capacity: usize,
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub async fn push(&self, notification: Notification) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(notification);
    }

    /// Newest first.
    pub async fn recent(&self) -> Vec<Notification> {
        self.entries.read().await.iter().rev().cloned().collect()
    }

    /// Log and keep every notification from `receiver` until the bus closes.
    pub async fn record(self, mut receiver: broadcast::Receiver<Notification>) {
        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    match notification.level {
                        NotificationLevel::Error => tracing::warn!(
                            job_id = notification.job_id,
                            "{}",
                            notification.message
                        ),
                        _ => tracing::info!(
                            job_id = notification.job_id,
                            "{}",
                            notification.message
                        ),
                    }
                    self.push(notification).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification recorder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Notification bus closed, recorder shutting down");
                    break;
                }
            }
        }
    }
}
