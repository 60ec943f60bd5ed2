//! Handlers for the `/presets` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use zenith_core::workflow::Workflow;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: usize,
}

#[derive(Debug, Deserialize)]
pub struct SavePreset {
    pub name: String,
    pub workflow: Workflow,
}

/// GET /api/v1/presets?page=N
///
/// Zero-based page, newest first.
pub async fn list_presets(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state.presets.list_page(query.page).await?;
    Ok(Json(DataResponse { data: page }))
}

/// POST /api/v1/presets
pub async fn save_preset(
    State(state): State<AppState>,
    Json(input): Json<SavePreset>,
) -> AppResult<impl IntoResponse> {
    let entry = state.presets.save(&input.name, &input.workflow).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: entry })))
}

/// GET /api/v1/presets/{file}
///
/// The preset ready for editing: positive prompts are cleared.
pub async fn load_preset(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> AppResult<impl IntoResponse> {
    let workflow = state.presets.load(&file).await?;
    Ok(Json(DataResponse { data: workflow }))
}

/// GET /api/v1/presets/{file}/details
pub async fn preset_details(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> AppResult<impl IntoResponse> {
    let details = state.presets.details(&file).await?;
    Ok(Json(DataResponse { data: details }))
}

/// DELETE /api/v1/presets/{file}
pub async fn delete_preset(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.presets.delete(&file).await?;
    Ok(StatusCode::NO_CONTENT)
}
