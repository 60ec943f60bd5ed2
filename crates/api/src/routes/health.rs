use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when ComfyUI does not answer.
    pub status: &'static str,
    pub version: &'static str,
    pub comfyui_reachable: bool,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let comfyui_reachable = state.comfyui.is_reachable().await;

    Json(HealthResponse {
        status: if comfyui_reachable { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        comfyui_reachable,
    })
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
