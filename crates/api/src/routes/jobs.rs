use axum::routing::{delete, get};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /                -> enqueue_job
/// DELETE /completed       -> clear_completed
/// GET    /{id}            -> get_job
/// GET    /{id}/image      -> get_job_image
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::enqueue_job))
        .route("/completed", delete(jobs::clear_completed))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/image", get(jobs::get_job_image))
}
