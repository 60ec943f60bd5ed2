pub mod health;
pub mod jobs;
pub mod presets;
pub mod system;
pub mod workflows;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                              list, enqueue
/// /jobs/completed                    clear completed (DELETE)
/// /jobs/{id}                         get
/// /jobs/{id}/image                   output image bytes
///
/// /workflows                         list base workflows
/// /workflows/validate                missing-model report (POST)
/// /workflows/{name}                  load base workflow
///
/// /presets                           list (paged), save
/// /presets/{file}                    load, delete
/// /presets/{file}/details            models summary and full graph
///
/// /models                            model catalog
/// /resources                         host sample and overload state
/// /notifications                     recent notifications
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/workflows", workflows::router())
        .nest("/presets", presets::router())
        .merge(system::router())
}
