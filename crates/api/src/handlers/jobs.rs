//! Handlers for the `/jobs` resource.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use zenith_core::error::CoreError;
use zenith_core::job::{Job, JobStatus};
use zenith_core::resources::OverloadReason;
use zenith_core::types::{JobId, Timestamp};
use zenith_core::workflow::{LatentSize, SamplerSettings, Workflow, TURBO_STEPS, TURBO_STEP_THRESHOLD};
use zenith_studio::queue::JobCounts;

use crate::error::{AppError, AppResult};
use crate::handlers::workflows::missing_models;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Request body for `POST /jobs`.
///
/// Edits are applied to the submitted graph in this order: prompts,
/// sampler, latent size, LoRAs. Turbo mode is applied last, after the
/// model check. Host load never blocks a request; it is reported back in
/// [`EnqueuedJob::overload`].
#[derive(Debug, Deserialize)]
pub struct EnqueueJob {
    pub workflow: Workflow,
    #[serde(default)]
    pub turbo_mode: bool,
    pub positive_prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub sampler: Option<SamplerSettings>,
    pub latent: Option<LatentSize>,
    #[serde(default)]
    pub loras: Vec<String>,
}

/// The created job, plus the thresholds the host exceeded at enqueue time.
#[derive(Debug, Serialize)]
pub struct EnqueuedJob {
    #[serde(flatten)]
    pub job: Job,
    /// Empty unless the host was overloaded. Advisory only.
    pub overload: Vec<OverloadReason>,
}

/// A job without its workflow graph.
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: f32,
    pub remote_id: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub elapsed_secs: Option<i64>,
    pub turbo_mode: bool,
    pub filename: Option<String>,
    pub error: Option<String>,
}

impl JobSummary {
    fn of(job: &Job, now: Timestamp) -> Self {
        Self {
            id: job.id(),
            status: job.status(),
            progress: job.progress(),
            remote_id: job.remote_id().map(str::to_string),
            created_at: job.created_at(),
            started_at: job.started_at(),
            elapsed_secs: job.elapsed_secs(now),
            turbo_mode: job.turbo_mode(),
            filename: job.result().map(|r| r.filename.clone()),
            error: job.error().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobList {
    pub jobs: Vec<JobSummary>,
    pub counts: JobCounts,
}

#[derive(Debug, Serialize)]
pub struct Cleared {
    pub removed: usize,
}

fn job_not_found(id: JobId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Job",
        id: id.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let queue = state.queue.lock().await;
    let now = Utc::now();
    let list = JobList {
        jobs: queue.jobs().iter().map(|job| JobSummary::of(job, now)).collect(),
        counts: queue.counts(),
    };
    Ok(Json(DataResponse { data: list }))
}

/// POST /api/v1/jobs
///
/// Applies the requested edits to the submitted graph, checks its models
/// against the local catalog (422 with the missing list), then enqueues a
/// snapshot. Returns 201 with the created job and any overload warning.
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(input): Json<EnqueueJob>,
) -> AppResult<impl IntoResponse> {
    let mut workflow = input.workflow;

    if input.positive_prompt.is_some() || input.negative_prompt.is_some() {
        workflow.set_prompts(input.positive_prompt.as_deref(), input.negative_prompt.as_deref());
    }
    if let Some(settings) = &input.sampler {
        workflow.apply_sampler_settings(settings)?;
    }
    if let Some(size) = &input.latent {
        workflow.apply_latent_size(size)?;
    }
    for lora in &input.loras {
        workflow.add_lora(lora)?;
    }

    if let Some(missing) = missing_models(&state, &workflow).await {
        if !missing.is_empty() {
            return Err(AppError::MissingModels(missing));
        }
    }

    let overload = state.guard.status().await.reasons;
    if !overload.is_empty() {
        tracing::warn!(reasons = ?overload, "Enqueueing while the host is overloaded");
    }

    if input.turbo_mode {
        workflow.apply_turbo_mode(TURBO_STEPS, TURBO_STEP_THRESHOLD);
    }

    let id = state.queue.enqueue(&workflow, input.turbo_mode).await;
    let job = state
        .queue
        .lock()
        .await
        .get(id)
        .cloned()
        .ok_or_else(|| AppError::InternalError(format!("job {id} vanished after enqueue")))?;

    tracing::info!(job_id = id, status = %job.status(), "Job enqueued via API");
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: EnqueuedJob { job, overload },
        }),
    ))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let queue = state.queue.lock().await;
    let job = queue.get(id).cloned().ok_or_else(|| job_not_found(id))?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/jobs/{id}/image
///
/// Raw bytes of a completed job's image. 404 until the job has one.
pub async fn get_job_image(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let queue = state.queue.lock().await;
    let job = queue.get(id).ok_or_else(|| job_not_found(id))?;
    let result = job.result().ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Image of job",
            id: id.to_string(),
        })
    })?;

    Ok(([(CONTENT_TYPE, content_type_for(&result.filename))], result.image.clone()))
}

/// DELETE /api/v1/jobs/completed
pub async fn clear_completed(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let removed = state.queue.lock().await.clear_completed();
    Ok(Json(DataResponse {
        data: Cleared { removed },
    }))
}

fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/png"
    }
}
