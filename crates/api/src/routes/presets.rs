use axum::routing::get;
use axum::Router;

use crate::handlers::presets;
use crate::state::AppState;

/// Routes mounted at `/presets`.
///
/// ```text
/// GET    /                -> list_presets (?page=N)
/// POST   /                -> save_preset
/// GET    /{file}          -> load_preset
/// DELETE /{file}          -> delete_preset
/// GET    /{file}/details  -> preset_details
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(presets::list_presets).post(presets::save_preset))
        .route("/{file}", get(presets::load_preset).delete(presets::delete_preset))
        .route("/{file}/details", get(presets::preset_details))
}
