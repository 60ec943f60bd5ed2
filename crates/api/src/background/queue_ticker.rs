//! Drives the job queue: refresh, promote, prune on a fixed interval.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use zenith_studio::SharedQueue;

/// Tick `queue` every `interval` until `cancel` fires.
pub async fn run(queue: SharedQueue, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_ms = interval.as_millis() as u64, "Queue ticker started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Queue ticker stopping");
                break;
            }
            _ = ticker.tick() => {
                queue.tick().await;
            }
        }
    }
}
