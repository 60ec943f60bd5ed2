//! Handlers for base workflows and model validation.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use zenith_core::validation::{find_missing_models, MissingModel};
use zenith_core::workflow::{ModelSelection, Workflow};
use zenith_studio::catalog::scan_models;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ValidateWorkflow {
    pub workflow: Workflow,
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    /// `false` when no model directory is configured and nothing was checked.
    pub checked: bool,
    pub missing: Vec<MissingModel>,
    pub models: Vec<ModelSelection>,
}

/// Models `workflow` references that the local catalog lacks.
///
/// `None` when no ComfyUI base path is configured: without a models
/// directory there is nothing to check against.
pub(crate) async fn missing_models(state: &AppState, workflow: &Workflow) -> Option<Vec<MissingModel>> {
    let Some(models_dir) = state.config.models_dir() else {
        tracing::debug!("No models directory configured, skipping model check");
        return None;
    };
    let catalog = scan_models(&models_dir).await;
    Some(find_missing_models(workflow, &catalog))
}

/// GET /api/v1/workflows
pub async fn list_workflows(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let names = state.workflows.list().await?;
    Ok(Json(DataResponse { data: names }))
}

/// GET /api/v1/workflows/{name}
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    let workflow = state.workflows.load(&name).await?;
    Ok(Json(DataResponse { data: workflow }))
}

/// POST /api/v1/workflows/validate
pub async fn validate_workflow(
    State(state): State<AppState>,
    Json(input): Json<ValidateWorkflow>,
) -> AppResult<impl IntoResponse> {
    let missing = missing_models(&state, &input.workflow).await;
    let report = ValidationReport {
        checked: missing.is_some(),
        missing: missing.unwrap_or_default(),
        models: input.workflow.model_selections(),
    };
    Ok(Json(DataResponse { data: report }))
}
