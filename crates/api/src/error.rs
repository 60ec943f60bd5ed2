use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use zenith_core::error::CoreError;
use zenith_core::validation::MissingModel;
use zenith_studio::StoreError;

/// Everything a handler can fail with.
///
/// Rendered as `{"error": <message>, "code": <CODE>}`; missing models add a
/// `missing` array.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The workflow references models the local catalog does not have.
    #[error("Workflow references {} missing model(s)", .0.len())]
    MissingModels(Vec<MissingModel>),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),

            AppError::Store(store) => match store {
                StoreError::Invalid(core) => classify_core_error(core),
                StoreError::NotFound(name) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{name} not found"),
                ),
                StoreError::Parse { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "INVALID_WORKFLOW",
                    store.to_string(),
                ),
                StoreError::Io { .. } => {
                    tracing::error!(error = %store, "Store I/O error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::MissingModels(missing) => {
                let body = json!({
                    "error": self.to_string(),
                    "code": "MISSING_MODELS",
                    "missing": missing,
                });
                return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response();
            }

            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
    }
}
