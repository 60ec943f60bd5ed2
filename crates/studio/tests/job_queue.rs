//! Job queue and resource guard behaviour against in-memory backends.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::json;
use zenith_comfyui::backend::{BackendError, FetchedImage, GenerationBackend, StatusReport};
use zenith_core::job::JobStatus;
use zenith_core::resources::{OverloadThresholds, ResourceSample};
use zenith_core::workflow::Workflow;
use zenith_events::{NotificationBus, NotificationLevel};
use zenith_monitor::{MonitorError, ResourceSampler};
use zenith_studio::artifacts::ArtifactCopier;
use zenith_studio::guard::{has_active_jobs, ResourceGuard};
use tokio::sync::Notify;
use zenith_studio::queue::{JobQueue, PollTarget, QueueConfig};
use zenith_studio::SharedQueue;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Prompts are named `prompt-<n>` after the submit call that created them.
/// Unscripted prompts report running at 25%.
#[derive(Default)]
struct StubBackend {
    submit_calls: Mutex<usize>,
    failing_submits: Mutex<HashSet<usize>>,
    statuses: Mutex<HashMap<String, StatusReport>>,
    images: Mutex<HashMap<String, FetchedImage>>,
    submitted: Mutex<Vec<Workflow>>,
}

impl StubBackend {
    fn fail_submit(&self, call: usize) {
        self.failing_submits.lock().unwrap().insert(call);
    }

    fn set_status(&self, prompt_id: &str, report: StatusReport) {
        self.statuses
            .lock()
            .unwrap()
            .insert(prompt_id.to_string(), report);
    }

    fn finish(&self, prompt_id: &str, image: Option<&[u8]>) {
        self.set_status(prompt_id, StatusReport::completed());
        if let Some(bytes) = image {
            self.images.lock().unwrap().insert(
                prompt_id.to_string(),
                FetchedImage {
                    bytes: bytes.to_vec(),
                    filename: format!("{prompt_id}.png"),
                    source_path: None,
                },
            );
        }
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    async fn submit(&self, workflow: &Workflow, _client_id: &str) -> Result<String, BackendError> {
        let call = {
            let mut calls = self.submit_calls.lock().unwrap();
            let call = *calls;
            *calls += 1;
            call
        };
        if self.failing_submits.lock().unwrap().contains(&call) {
            return Err(BackendError::Connection("connection refused".into()));
        }
        self.submitted.lock().unwrap().push(workflow.clone());
        Ok(format!("prompt-{call}"))
    }

    async fn poll_status(&self, remote_id: &str) -> StatusReport {
        self.statuses
            .lock()
            .unwrap()
            .get(remote_id)
            .cloned()
            .unwrap_or_else(|| StatusReport::running(Some(0.25)))
    }

    async fn fetch_image(&self, remote_id: &str) -> Option<FetchedImage> {
        self.images.lock().unwrap().get(remote_id).cloned()
    }
}

/// Parks submits and/or polls until `release` is notified.
#[derive(Default)]
struct GatedBackend {
    gate_submits: bool,
    gate_polls: bool,
    entered: Notify,
    release: Notify,
}

impl GatedBackend {
    async fn gate(&self, active: bool) {
        if active {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl GenerationBackend for GatedBackend {
    async fn submit(&self, _workflow: &Workflow, _client_id: &str) -> Result<String, BackendError> {
        self.gate(self.gate_submits).await;
        Ok("prompt-gated".into())
    }

    async fn poll_status(&self, _remote_id: &str) -> StatusReport {
        self.gate(self.gate_polls).await;
        StatusReport::running(Some(0.5))
    }

    async fn fetch_image(&self, _remote_id: &str) -> Option<FetchedImage> {
        None
    }
}

struct StubSampler(Result<ResourceSample, &'static str>);

#[async_trait]
impl ResourceSampler for StubSampler {
    async fn sample(&self) -> Result<ResourceSample, MonitorError> {
        self.0.clone().map_err(|reason| MonitorError::Parse(reason.to_string()))
    }
}

fn workflow() -> Workflow {
    Workflow::from_value(json!({
        "3": { "class_type": "KSampler", "inputs": { "steps": 30, "seed": 1 } },
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "a lighthouse" }, "_meta": { "title": "Positive Prompt" } }
    }))
    .unwrap()
}

fn queue(backend: &Arc<StubBackend>) -> JobQueue {
    JobQueue::new(backend.clone(), QueueConfig::default()).with_client_id("test-client")
}

fn sample(cpu: f32) -> ResourceSample {
    ResourceSample {
        cpu_percent: cpu,
        ram_percent: 40.0,
        ram_available_gb: 12.0,
        gpus: None,
    }
}

// ---------------------------------------------------------------------------
// Enqueue and promotion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ids_increase_and_running_is_capped() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend);

    let mut ids = Vec::new();
    for _ in 0..7 {
        ids.push(queue.enqueue(&workflow(), false).await);
    }

    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 6]);
    let counts = queue.counts();
    assert_eq!(counts.running, 5);
    assert_eq!(counts.queued, 2);
    assert_eq!(queue.get(0).unwrap().remote_id(), Some("prompt-0"));
    assert_eq!(queue.get(5).unwrap().status(), JobStatus::Queued);
    assert!(has_active_jobs(&queue));
}

#[tokio::test]
async fn freed_slot_goes_to_oldest_queued_job() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend);
    for _ in 0..7 {
        queue.enqueue(&workflow(), false).await;
    }

    backend.set_status("prompt-1", StatusReport::failed("Out of memory"));
    queue.tick().await;

    let failed = queue.get(1).unwrap();
    assert_eq!(failed.status(), JobStatus::Failed);
    assert_eq!(failed.error(), Some("Out of memory"));
    assert_eq!(queue.get(5).unwrap().status(), JobStatus::Running);
    assert_eq!(queue.get(6).unwrap().status(), JobStatus::Queued);
    assert_eq!(queue.running_count(), 5);
}

#[tokio::test]
async fn failed_submission_does_not_stall_the_queue() {
    let backend = Arc::new(StubBackend::default());
    backend.fail_submit(0);
    let mut queue = queue(&backend);

    queue.enqueue(&workflow(), false).await;
    queue.enqueue(&workflow(), false).await;

    let first = queue.get(0).unwrap();
    assert_eq!(first.status(), JobStatus::Failed);
    assert!(first.error().unwrap().starts_with("Submission failed"));
    assert_eq!(queue.get(1).unwrap().status(), JobStatus::Running);
}

#[tokio::test]
async fn enqueue_snapshots_the_workflow() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend);

    let mut draft = workflow();
    let id = queue.enqueue(&draft, true).await;
    draft.set_prompts(Some("edited afterwards"), None);

    let job = queue.get(id).unwrap();
    assert!(job.turbo_mode());
    assert_eq!(job.workflow().node("6").unwrap()["inputs"]["text"], "a lighthouse");
    assert_eq!(
        backend.submitted.lock().unwrap()[0].node("6").unwrap()["inputs"]["text"],
        "a lighthouse"
    );
}

#[tokio::test]
async fn claimed_submission_holds_its_slot() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = JobQueue::new(backend.clone(), QueueConfig::new(1, Duration::from_secs(300)));
    queue.push(&workflow(), false);
    queue.push(&workflow(), false);

    let claimed = queue.claim_submissions();
    assert_eq!(claimed.iter().map(|c| c.id).collect::<Vec<_>>(), vec![0]);
    assert!(queue.claim_submissions().is_empty());
    assert_eq!(queue.get(0).unwrap().status(), JobStatus::Queued);

    queue.finish_submission(0, Ok("prompt-x".into()));
    assert_eq!(queue.get(0).unwrap().status(), JobStatus::Running);
    assert!(queue.claim_submissions().is_empty());
}

#[tokio::test]
async fn report_for_job_that_left_running_is_ignored() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend);
    queue.enqueue(&workflow(), false).await;
    let target = queue.poll_targets().remove(0);
    assert_eq!(
        target,
        PollTarget {
            id: 0,
            remote_id: "prompt-0".into()
        }
    );

    queue.apply_report(target.clone(), StatusReport::failed("boom"));
    queue.apply_report(target, StatusReport::completed());

    assert_eq!(queue.get(0).unwrap().status(), JobStatus::Failed);
    assert_eq!(queue.pending_fetch_count(), 0);
}

// ---------------------------------------------------------------------------
// Shared queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shared_queue_stays_readable_during_a_slow_submit() {
    let backend = Arc::new(GatedBackend {
        gate_submits: true,
        ..GatedBackend::default()
    });
    let shared = SharedQueue::new(JobQueue::new(backend.clone(), QueueConfig::default()));

    let enqueue = tokio::spawn({
        let shared = shared.clone();
        async move { shared.enqueue(&workflow(), false).await }
    });
    backend.entered.notified().await;

    let counts = tokio::time::timeout(Duration::from_secs(1), async { shared.lock().await.counts() })
        .await
        .expect("queue lock was held across the submit");
    assert_eq!(counts.queued, 1);

    backend.release.notify_one();
    let id = enqueue.await.unwrap();
    let queue = shared.lock().await;
    assert_eq!(queue.get(id).unwrap().status(), JobStatus::Running);
    assert_eq!(queue.get(id).unwrap().remote_id(), Some("prompt-gated"));
}

#[tokio::test]
async fn shared_queue_stays_readable_during_a_slow_poll() {
    let backend = Arc::new(GatedBackend {
        gate_polls: true,
        ..GatedBackend::default()
    });
    let shared = SharedQueue::new(JobQueue::new(backend.clone(), QueueConfig::default()));
    shared.enqueue(&workflow(), false).await;

    let tick = tokio::spawn({
        let shared = shared.clone();
        async move { shared.tick().await }
    });
    backend.entered.notified().await;

    let running = tokio::time::timeout(Duration::from_secs(1), async { shared.lock().await.running_count() })
        .await
        .expect("queue lock was held across the poll");
    assert_eq!(running, 1);

    backend.release.notify_one();
    tick.await.unwrap();
    assert_eq!(shared.lock().await.get(0).unwrap().progress(), 0.5);
}

#[tokio::test]
async fn shared_queue_tick_completes_jobs() {
    let backend = Arc::new(StubBackend::default());
    let shared = SharedQueue::new(queue(&backend));
    for _ in 0..6 {
        shared.enqueue(&workflow(), false).await;
    }
    assert_eq!(shared.lock().await.counts().queued, 1);

    backend.finish("prompt-0", Some(b"png"));
    shared.tick().await;
    shared.lock().await.drain_fetches().await;
    shared.tick().await;

    let queue = shared.lock().await;
    assert_eq!(queue.get(0).unwrap().status(), JobStatus::Completed);
    assert_eq!(queue.get(5).unwrap().status(), JobStatus::Running);
    assert_eq!(queue.running_count(), 5);
}

// ---------------------------------------------------------------------------
// Status refresh and image fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn running_progress_follows_the_backend() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend);
    queue.enqueue(&workflow(), false).await;

    queue.refresh_statuses().await;
    assert_eq!(queue.get(0).unwrap().progress(), 0.25);

    backend.set_status("prompt-0", StatusReport::running(None));
    queue.refresh_statuses().await;
    assert_eq!(queue.get(0).unwrap().progress(), 0.25);
}

#[tokio::test]
async fn finished_prompt_completes_after_fetch() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend);
    queue.enqueue(&workflow(), false).await;

    backend.finish("prompt-0", Some(b"png bytes"));
    queue.refresh_statuses().await;

    // Still running while the fetch is in flight.
    let job = queue.get(0).unwrap();
    assert_eq!(job.status(), JobStatus::Running);
    assert_eq!(job.progress(), 1.0);
    assert_eq!(queue.pending_fetch_count(), 1);

    queue.drain_fetches().await;

    let job = queue.get(0).unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
    let result = job.result().unwrap();
    assert_eq!(result.filename, "prompt-0.png");
    assert_eq!(result.image, b"png bytes");
    assert!(!queue.has_active_jobs());
}

#[tokio::test]
async fn missing_image_fails_the_job() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend);
    queue.enqueue(&workflow(), false).await;

    backend.finish("prompt-0", None);
    queue.refresh_statuses().await;
    queue.drain_fetches().await;

    let job = queue.get(0).unwrap();
    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.error(), Some("Image could not be retrieved from the backend"));
}

#[tokio::test]
async fn completed_image_is_copied_to_destinations() {
    let gallery = tempfile::tempdir().unwrap();
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend).with_artifacts(ArtifactCopier::new(Some(gallery.path().to_path_buf()), None));
    queue.enqueue(&workflow(), false).await;

    backend.finish("prompt-0", Some(b"png bytes"));
    queue.refresh_statuses().await;
    queue.drain_fetches().await;

    assert_eq!(std::fs::read(gallery.path().join("prompt-0.png")).unwrap(), b"png bytes");
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

async fn completed_queue(backend: &Arc<StubBackend>) -> JobQueue {
    let mut queue = queue(backend);
    queue.enqueue(&workflow(), false).await;
    queue.enqueue(&workflow(), false).await;
    backend.finish("prompt-0", Some(b"png"));
    backend.set_status("prompt-1", StatusReport::failed("boom"));
    queue.refresh_statuses().await;
    queue.drain_fetches().await;
    assert_eq!(queue.get(0).unwrap().status(), JobStatus::Completed);
    assert_eq!(queue.get(1).unwrap().status(), JobStatus::Failed);
    queue
}

#[tokio::test]
async fn prune_removes_completed_jobs_past_ttl() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = completed_queue(&backend).await;
    let started = queue.get(0).unwrap().started_at().unwrap();

    assert_eq!(queue.prune_at(started + chrono::Duration::seconds(299)), 0);
    assert_eq!(queue.jobs().len(), 2);

    assert_eq!(queue.prune_at(started + chrono::Duration::seconds(301)), 1);
    assert!(queue.get(0).is_none());
    // Failed jobs stay until the user looks at them.
    assert_eq!(queue.get(1).unwrap().status(), JobStatus::Failed);
}

#[tokio::test]
async fn clear_completed_keeps_everything_else() {
    let backend = Arc::new(StubBackend::default());
    let mut queue = completed_queue(&backend).await;
    queue.enqueue(&workflow(), false).await;

    assert_eq!(queue.clear_completed(), 1);
    assert_eq!(queue.jobs().len(), 2);
    assert!(queue.jobs().iter().all(|j| j.status() != JobStatus::Completed));
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_is_announced() {
    let bus = NotificationBus::default();
    let mut rx = bus.subscribe();
    let backend = Arc::new(StubBackend::default());
    let mut queue = queue(&backend).with_notifications(bus);

    queue.enqueue(&workflow(), false).await;
    backend.finish("prompt-0", Some(b"png"));
    queue.refresh_statuses().await;
    queue.drain_fetches().await;

    let added = rx.recv().await.unwrap();
    assert_eq!(added.level, NotificationLevel::Info);
    assert_eq!(added.job_id, Some(0));
    let done = rx.recv().await.unwrap();
    assert_eq!(done.level, NotificationLevel::Success);
}

// ---------------------------------------------------------------------------
// Resource guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn guard_reports_overload_above_threshold() {
    let guard = ResourceGuard::new(Arc::new(StubSampler(Ok(sample(95.0)))), OverloadThresholds::default());
    assert!(guard.is_overloaded().await);

    let status = guard.status().await;
    assert!(status.overloaded);
    assert_eq!(status.reasons.len(), 1);
}

#[tokio::test]
async fn guard_uses_explicit_thresholds() {
    let guard = ResourceGuard::new(Arc::new(StubSampler(Ok(sample(81.0)))), OverloadThresholds::default());
    assert!(guard.is_overloaded().await);

    let relaxed = OverloadThresholds {
        cpu_percent: 81.0,
        ..OverloadThresholds::default()
    };
    assert!(!guard.is_overloaded_with(&relaxed).await);
}

#[tokio::test]
async fn guard_fails_open_when_sampling_fails() {
    let guard = ResourceGuard::new(Arc::new(StubSampler(Err("garbled /proc/stat"))), OverloadThresholds::default());
    assert!(!guard.is_overloaded().await);
    assert_matches!(guard.sample_resources().await, Err(MonitorError::Parse(_)));

    let status = guard.status().await;
    assert!(status.sample.is_none());
    assert!(!status.overloaded);
}
