//! Generation job queue.
//!
//! The queue owns its jobs and is driven from outside: a host calls
//! [`JobQueue::tick`] (or the individual steps) at a regular interval.
//! Promotion and polling are also exposed as claim / apply pairs so a
//! shared queue can talk to the backend without holding its lock; see
//! [`SharedQueue`](crate::shared::SharedQueue).
//! Nothing here runs on its own except image fetches, which are spawned
//! so a slow or retrying fetch never blocks a tick. A job whose prompt
//! finished stays `running` until its fetch reports back on a later tick.
//!
//! Invariants:
//! - ids increase from 0 and are never reused;
//! - at most `max_concurrent` jobs are running or being submitted;
//! - queued jobs are promoted in FIFO order;
//! - only completed jobs are ever removed automatically.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use zenith_comfyui::backend::{BackendError, FetchedImage, GenerationBackend, RemoteStatus, StatusReport};
use zenith_core::job::{Job, JobResult, JobStatus};
use zenith_core::types::{JobId, Timestamp};
use zenith_core::workflow::Workflow;
use zenith_events::{Notification, NotificationBus};

use crate::artifacts::ArtifactCopier;
use crate::config::StudioConfig;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_COMPLETED_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    /// Completed jobs are removed once they started longer ago than this.
    pub completed_ttl: chrono::Duration,
}

impl QueueConfig {
    pub fn new(max_concurrent: usize, completed_ttl: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            completed_ttl: chrono::Duration::from_std(completed_ttl)
                .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100)),
        }
    }
}

impl From<&StudioConfig> for QueueConfig {
    fn from(config: &StudioConfig) -> Self {
        Self::new(config.max_concurrent_jobs, config.completed_job_ttl)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, DEFAULT_COMPLETED_TTL)
    }
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

type FetchHandle = JoinHandle<Option<FetchedImage>>;

/// A queued job claimed for submission, with the snapshot to send.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: JobId,
    pub workflow: Workflow,
}

/// A running job whose backend status should be polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub id: JobId,
    pub remote_id: String,
}

pub struct JobQueue {
    backend: Arc<dyn GenerationBackend>,
    config: QueueConfig,
    client_id: String,
    jobs: Vec<Job>,
    next_id: JobId,
    pending_fetches: HashMap<JobId, FetchHandle>,
    /// Claimed by [`JobQueue::claim_submissions`], not yet applied.
    submitting: HashSet<JobId>,
    artifacts: ArtifactCopier,
    notifications: NotificationBus,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("client_id", &self.client_id)
            .field("config", &self.config)
            .field("counts", &self.counts())
            .field("pending_fetches", &self.pending_fetches.len())
            .field("submitting", &self.submitting.len())
            .finish()
    }
}

impl JobQueue {
    /// A queue with a fresh client id, no copy destinations and its own
    /// notification bus.
    pub fn new(backend: Arc<dyn GenerationBackend>, config: QueueConfig) -> Self {
        Self {
            backend,
            config,
            client_id: uuid::Uuid::new_v4().to_string(),
            jobs: Vec::new(),
            next_id: 0,
            pending_fetches: HashMap::new(),
            submitting: HashSet::new(),
            artifacts: ArtifactCopier::disabled(),
            notifications: NotificationBus::default(),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactCopier) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationBus) -> Self {
        self.notifications = notifications;
        self
    }

    // ---- accessors ----

    /// Client id sent with every submission; progress events for this
    /// session's prompts are addressed to it.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationBus {
        &self.notifications
    }

    pub fn backend(&self) -> Arc<dyn GenerationBackend> {
        Arc::clone(&self.backend)
    }

    /// Jobs in creation order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id() == id)
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in &self.jobs {
            match job.status() {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Any job queued or running.
    pub fn has_active_jobs(&self) -> bool {
        self.jobs.iter().any(|j| j.status().is_active())
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status() == JobStatus::Running)
            .count()
    }

    /// Image fetches spawned but not yet applied.
    pub fn pending_fetch_count(&self) -> usize {
        self.pending_fetches.len()
    }

    // ---- operations ----

    /// Snapshot `workflow` into a new queued job and try to start it.
    pub async fn enqueue(&mut self, workflow: &Workflow, turbo_mode: bool) -> JobId {
        let id = self.push(workflow, turbo_mode);
        self.promote_pending().await;
        id
    }

    /// Snapshot `workflow` into a new queued job without promoting it.
    pub fn push(&mut self, workflow: &Workflow, turbo_mode: bool) -> JobId {
        let id = self.next_id;
        self.next_id += 1;

        self.jobs
            .push(Job::new(id, workflow.clone(), turbo_mode, Utc::now()));
        tracing::info!(job_id = id, turbo_mode, nodes = workflow.len(), "Job queued");
        self.notifications
            .publish(Notification::info(format!("Generation #{id} added to the queue")).for_job(id));
        id
    }

    /// Submit queued jobs, oldest first, while running slots are free.
    ///
    /// A failed submission fails that job immediately and moves on to the
    /// next one.
    pub async fn promote_pending(&mut self) {
        for submission in self.claim_submissions() {
            let result = self.backend.submit(&submission.workflow, &self.client_id).await;
            self.finish_submission(submission.id, result);
        }
    }

    /// Claim queued jobs, oldest first, for every free slot. Claimed jobs
    /// stay queued but hold their slot until
    /// [`finish_submission`](Self::finish_submission).
    pub fn claim_submissions(&mut self) -> Vec<Submission> {
        let busy = self.running_count() + self.submitting.len();
        let free = self.config.max_concurrent.saturating_sub(busy);

        let claimed: Vec<Submission> = self
            .jobs
            .iter()
            .filter(|j| j.status() == JobStatus::Queued && !self.submitting.contains(&j.id()))
            .take(free)
            .map(|j| Submission {
                id: j.id(),
                workflow: j.workflow().clone(),
            })
            .collect();

        self.submitting.extend(claimed.iter().map(|c| c.id));
        claimed
    }

    /// Apply the backend's answer to a claimed submission.
    pub fn finish_submission(&mut self, id: JobId, result: Result<String, BackendError>) {
        self.submitting.remove(&id);
        let Some(idx) = self.index_of(id) else {
            return;
        };

        match result {
            Ok(remote_id) => {
                tracing::info!(job_id = id, prompt_id = %remote_id, "Job started");
                if let Err(e) = self.jobs[idx].start(remote_id, Utc::now()) {
                    tracing::error!(job_id = id, error = %e, "Cannot start job");
                }
            }
            Err(e) => {
                tracing::warn!(job_id = id, error = %e, "Submission failed");
                self.fail_job(idx, format!("Submission failed: {e}"));
            }
        }
    }

    /// Apply finished fetches, then poll every running job that is not
    /// already fetching its image.
    pub async fn refresh_statuses(&mut self) {
        self.harvest_fetches().await;

        let targets = self.poll_targets();
        if targets.is_empty() {
            return;
        }

        let backend = &self.backend;
        let reports = join_all(targets.iter().map(|t| backend.poll_status(&t.remote_id))).await;

        for (target, report) in targets.into_iter().zip(reports) {
            self.apply_report(target, report);
        }
    }

    /// Running jobs that are not already fetching their image.
    pub fn poll_targets(&self) -> Vec<PollTarget> {
        self.jobs
            .iter()
            .filter(|j| j.status() == JobStatus::Running && !self.pending_fetches.contains_key(&j.id()))
            .filter_map(|j| {
                j.remote_id().map(|remote_id| PollTarget {
                    id: j.id(),
                    remote_id: remote_id.to_string(),
                })
            })
            .collect()
    }

    /// Apply one status report. A completed prompt starts its image fetch.
    /// Reports for jobs that are gone, no longer running or already
    /// fetching are ignored.
    pub fn apply_report(&mut self, target: PollTarget, report: StatusReport) {
        let PollTarget { id, remote_id } = target;
        let Some(idx) = self.index_of(id) else {
            return;
        };
        if self.jobs[idx].status() != JobStatus::Running || self.pending_fetches.contains_key(&id) {
            return;
        }

        match report.status {
            RemoteStatus::Running => {
                if let Some(progress) = report.progress {
                    self.jobs[idx].set_progress(progress);
                }
            }
            RemoteStatus::Completed => {
                self.jobs[idx].set_progress(1.0);
                tracing::debug!(job_id = id, prompt_id = %remote_id, "Prompt finished, fetching image");
                let backend = Arc::clone(&self.backend);
                let handle = tokio::spawn(async move { backend.fetch_image(&remote_id).await });
                self.pending_fetches.insert(id, handle);
            }
            RemoteStatus::Failed => {
                let message = report
                    .error
                    .unwrap_or_else(|| "Generation failed on the backend".to_string());
                tracing::warn!(job_id = id, prompt_id = %remote_id, error = %message, "Job failed");
                self.fail_job(idx, message);
            }
        }
    }

    /// Wait for every in-flight image fetch and apply its result.
    pub async fn drain_fetches(&mut self) {
        let handles: Vec<(JobId, FetchHandle)> = self.pending_fetches.drain().collect();
        for (id, handle) in handles {
            let outcome = handle.await;
            self.apply_fetch(id, outcome).await;
        }
    }

    /// Remove completed jobs older than the TTL. Returns how many went.
    pub fn prune(&mut self) -> usize {
        self.prune_at(Utc::now())
    }

    /// [`prune`](Self::prune) against an explicit clock reading.
    pub fn prune_at(&mut self, now: Timestamp) -> usize {
        let ttl = self.config.completed_ttl;
        let before = self.jobs.len();
        self.jobs.retain(|j| !j.is_expired(now, ttl));
        let removed = before - self.jobs.len();
        if removed > 0 {
            tracing::debug!(removed, "Pruned expired completed jobs");
        }
        removed
    }

    /// Remove every completed job regardless of age.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.status() != JobStatus::Completed);
        let removed = before - self.jobs.len();
        tracing::info!(removed, "Cleared completed jobs");
        removed
    }

    /// One scheduling round: refresh, promote, prune.
    pub async fn tick(&mut self) {
        self.refresh_statuses().await;
        self.promote_pending().await;
        self.prune();
    }

    // ---- private helpers ----

    fn index_of(&self, id: JobId) -> Option<usize> {
        self.jobs.iter().position(|j| j.id() == id)
    }

    fn fail_job(&mut self, idx: usize, message: String) {
        let id = self.jobs[idx].id();
        match self.jobs[idx].fail(message.clone()) {
            Ok(()) => {
                self.notifications.publish(
                    Notification::error(format!("Generation #{id} failed: {message}")).for_job(id),
                );
            }
            Err(e) => tracing::error!(job_id = id, error = %e, "Cannot fail job"),
        }
    }

    /// Apply every fetch that has already finished.
    pub async fn harvest_fetches(&mut self) {
        let finished: Vec<JobId> = self
            .pending_fetches
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for id in finished {
            if let Some(handle) = self.pending_fetches.remove(&id) {
                let outcome = handle.await;
                self.apply_fetch(id, outcome).await;
            }
        }
    }

    async fn apply_fetch(&mut self, id: JobId, outcome: Result<Option<FetchedImage>, JoinError>) {
        let Some(idx) = self.index_of(id) else {
            return;
        };

        match outcome {
            Ok(Some(image)) => {
                let result = JobResult {
                    filename: image.filename,
                    source_path: image.source_path,
                    image: image.bytes,
                };
                if let Err(e) = self.jobs[idx].complete(result) {
                    tracing::error!(job_id = id, error = %e, "Cannot complete job");
                    return;
                }
                tracing::info!(job_id = id, "Job completed");
                if let Some(result) = self.jobs[idx].result() {
                    self.artifacts.copy_all(result).await;
                }
                self.notifications
                    .publish(Notification::success(format!("Generation #{id} finished")).for_job(id));
            }
            Ok(None) => {
                self.fail_job(idx, "Image could not be retrieved from the backend".to_string());
            }
            Err(e) => {
                tracing::error!(job_id = id, error = %e, "Image fetch task failed");
                self.fail_job(idx, format!("Image fetch task failed: {e}"));
            }
        }
    }
}
