use axum::routing::{get, post};
use axum::Router;

use crate::handlers::workflows;
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// GET    /                -> list_workflows
/// POST   /validate        -> validate_workflow
/// GET    /{name}          -> get_workflow
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(workflows::list_workflows))
        .route("/validate", post(workflows::validate_workflow))
        .route("/{name}", get(workflows::get_workflow))
}
