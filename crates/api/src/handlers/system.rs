//! Model catalog, host resources and notifications.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use zenith_core::catalog::ModelCatalog;
use zenith_studio::catalog::scan_models;
use zenith_studio::guard::{has_active_jobs, GuardStatus};
use zenith_studio::queue::JobCounts;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ResourceStatus {
    #[serde(flatten)]
    pub guard: GuardStatus,
    pub active_jobs: bool,
    pub counts: JobCounts,
}

/// GET /api/v1/models
///
/// Rescans the models directory on every call. Empty when no ComfyUI base
/// path is configured.
pub async fn list_models(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let catalog = match state.config.models_dir() {
        Some(dir) => scan_models(&dir).await,
        None => ModelCatalog::new(),
    };
    Ok(Json(DataResponse { data: catalog }))
}

/// GET /api/v1/resources
pub async fn resource_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let guard = state.guard.status().await;
    let (active_jobs, counts) = {
        let queue = state.queue.lock().await;
        (has_active_jobs(&queue), queue.counts())
    };
    Ok(Json(DataResponse {
        data: ResourceStatus {
            guard,
            active_jobs,
            counts,
        },
    }))
}

/// GET /api/v1/notifications
///
/// Newest first.
pub async fn recent_notifications(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let recent = state.notification_log.recent().await;
    Ok(Json(DataResponse { data: recent }))
}
