use axum::routing::get;
use axum::Router;

use crate::handlers::system;
use crate::state::AppState;

/// Studio-wide read-only routes.
///
/// ```text
/// GET    /models          -> list_models
/// GET    /resources       -> resource_status
/// GET    /notifications   -> recent_notifications
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models", get(system::list_models))
        .route("/resources", get(system::resource_status))
        .route("/notifications", get(system::recent_notifications))
}
