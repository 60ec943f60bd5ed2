//! A [`JobQueue`] shared between request handlers and the ticker.
//!
//! Backend calls (submits, status polls) run with the queue unlocked, so
//! readers never wait on a slow or hanging ComfyUI. The queue lock is taken
//! only to claim work and to apply results. A second lock serialises
//! promotion so prompts still reach the backend in FIFO order.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, MutexGuard};
use zenith_core::types::JobId;
use zenith_core::workflow::Workflow;

use crate::queue::JobQueue;

#[derive(Debug, Clone)]
pub struct SharedQueue {
    queue: Arc<Mutex<JobQueue>>,
    promotion: Arc<Mutex<()>>,
}

impl SharedQueue {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue: Arc::new(Mutex::new(queue)),
            promotion: Arc::new(Mutex::new(())),
        }
    }

    /// Exclusive access for reads and synchronous updates. Never held
    /// across a backend call by this type.
    pub async fn lock(&self) -> MutexGuard<'_, JobQueue> {
        self.queue.lock().await
    }

    /// Queue a snapshot of `workflow`, then promote.
    pub async fn enqueue(&self, workflow: &Workflow, turbo_mode: bool) -> JobId {
        let id = self.queue.lock().await.push(workflow, turbo_mode);
        self.promote_pending().await;
        id
    }

    /// Submit claimed jobs one at a time, applying each answer as it
    /// arrives.
    pub async fn promote_pending(&self) {
        let _order = self.promotion.lock().await;

        let (backend, client_id, claimed) = {
            let mut queue = self.queue.lock().await;
            (queue.backend(), queue.client_id().to_string(), queue.claim_submissions())
        };

        for submission in claimed {
            let result = backend.submit(&submission.workflow, &client_id).await;
            self.queue.lock().await.finish_submission(submission.id, result);
        }
    }

    /// Harvest finished fetches, poll running jobs concurrently with the
    /// queue unlocked, then apply the reports.
    pub async fn refresh_statuses(&self) {
        let (backend, targets) = {
            let mut queue = self.queue.lock().await;
            queue.harvest_fetches().await;
            (queue.backend(), queue.poll_targets())
        };
        if targets.is_empty() {
            return;
        }

        let reports = join_all(targets.iter().map(|t| backend.poll_status(&t.remote_id))).await;

        let mut queue = self.queue.lock().await;
        for (target, report) in targets.into_iter().zip(reports) {
            queue.apply_report(target, report);
        }
    }

    /// One scheduling round: refresh, promote, prune.
    pub async fn tick(&self) {
        self.refresh_statuses().await;
        self.promote_pending().await;
        self.queue.lock().await.prune();
    }
}
