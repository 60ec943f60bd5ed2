//! The generation backend seam used by the job queue.
//!
//! [`GenerationBackend`] is the narrow interface the queue drives:
//! submit a workflow, poll a remote prompt, fetch its output image.
//! [`ComfyUIBackend`] implements it over [`ComfyUIApi`].

use std::path::PathBuf;

use async_trait::async_trait;
use zenith_core::workflow::Workflow;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::history::{find_output_image, history_entry, outcome, HistoryOutcome};
use crate::progress::ProgressBoard;
use crate::retry::{retry_fixed, FetchRetryConfig};

/// Submission failure. Never panics, never retried by the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The server could not be reached or the response was unreadable.
    #[error("Cannot reach ComfyUI: {0}")]
    Connection(String),

    /// The server answered with a non-success status (e.g. invalid graph).
    #[error("ComfyUI rejected the workflow ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<ComfyUIApiError> for BackendError {
    fn from(err: ComfyUIApiError) -> Self {
        match err {
            ComfyUIApiError::Request(e) => Self::Connection(e.to_string()),
            ComfyUIApiError::Status { status, body } => Self::Rejected { status, body },
        }
    }
}

/// Remote state of a submitted prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Running,
    Completed,
    Failed,
}

/// Result of one status poll.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: RemoteStatus,
    /// `None` when progress is unknown and the caller should keep its last value.
    pub progress: Option<f32>,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn running(progress: Option<f32>) -> Self {
        Self {
            status: RemoteStatus::Running,
            progress,
            error: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: RemoteStatus::Completed,
            progress: Some(1.0),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: RemoteStatus::Failed,
            progress: None,
            error: Some(message.into()),
        }
    }
}

/// A downloaded output image.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    /// `<output_dir>/<subfolder>/<filename>` when the output directory is known.
    pub source_path: Option<PathBuf>,
}

/// Narrow interface to an image-generation server.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Queue `workflow` on the server, returning its remote prompt id.
    async fn submit(&self, workflow: &Workflow, client_id: &str) -> Result<String, BackendError>;

    /// Idempotent status read. Transport errors report `Running` with
    /// unknown progress; only the server itself can fail a prompt.
    async fn poll_status(&self, remote_id: &str) -> StatusReport;

    /// Download the output image of a finished prompt, retrying while the
    /// history entry catches up. `None` when no output appeared in time.
    async fn fetch_image(&self, remote_id: &str) -> Option<FetchedImage>;
}

/// [`GenerationBackend`] over a ComfyUI server.
#[derive(Debug, Clone)]
pub struct ComfyUIBackend {
    api: ComfyUIApi,
    retry: FetchRetryConfig,
    output_dir: Option<PathBuf>,
    progress: Option<ProgressBoard>,
}

impl ComfyUIBackend {
    pub fn new(api: ComfyUIApi) -> Self {
        Self {
            api,
            retry: FetchRetryConfig::default(),
            output_dir: None,
            progress: None,
        }
    }

    pub fn with_retry(mut self, retry: FetchRetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Directory the server writes outputs to, used to compute source paths.
    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    /// Board fed by a WebSocket progress stream.
    pub fn with_progress_board(mut self, board: ProgressBoard) -> Self {
        self.progress = Some(board);
        self
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    async fn board_fraction(&self, remote_id: &str) -> Option<f32> {
        match &self.progress {
            Some(board) => board.get(remote_id).await.map(|p| p.fraction),
            None => None,
        }
    }

    async fn forget_progress(&self, remote_id: &str) {
        if let Some(board) = &self.progress {
            board.remove(remote_id).await;
        }
    }

    async fn try_fetch(&self, remote_id: &str, attempt: u32) -> Option<FetchedImage> {
        let history = match self.api.get_history(remote_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::debug!(prompt_id = %remote_id, attempt, error = %e, "History read failed");
                return None;
            }
        };

        let Some(image) = history_entry(&history, remote_id).and_then(find_output_image) else {
            tracing::debug!(prompt_id = %remote_id, attempt, "Output image not in history yet");
            return None;
        };

        match self.api.download_output(&image).await {
            Ok(bytes) => {
                let source_path = self
                    .output_dir
                    .as_ref()
                    .map(|dir| dir.join(&image.subfolder).join(&image.filename));
                tracing::debug!(prompt_id = %remote_id, attempt, filename = %image.filename, "Output image downloaded");
                Some(FetchedImage {
                    bytes,
                    filename: image.filename,
                    source_path,
                })
            }
            Err(e) => {
                tracing::debug!(prompt_id = %remote_id, attempt, error = %e, "Output download failed");
                None
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for ComfyUIBackend {
    async fn submit(&self, workflow: &Workflow, client_id: &str) -> Result<String, BackendError> {
        let response = self.api.submit_workflow(&workflow.to_value(), client_id).await?;
        tracing::info!(prompt_id = %response.prompt_id, number = response.number, "Workflow submitted");
        Ok(response.prompt_id)
    }

    async fn poll_status(&self, remote_id: &str) -> StatusReport {
        let history = match self.api.get_history(remote_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(prompt_id = %remote_id, error = %e, "Status poll failed, keeping job running");
                return StatusReport::running(None);
            }
        };

        if let Some(entry) = history_entry(&history, remote_id) {
            self.forget_progress(remote_id).await;
            return match outcome(entry) {
                HistoryOutcome::Completed => StatusReport::completed(),
                HistoryOutcome::Failed(message) => StatusReport::failed(message),
            };
        }

        match self.api.get_queue().await {
            Ok(queue) if queue.contains(remote_id) => {
                let progress = self.board_fraction(remote_id).await.unwrap_or(0.0);
                StatusReport::running(Some(progress))
            }
            Ok(_) => {
                self.forget_progress(remote_id).await;
                StatusReport::failed("Execution not found on the backend")
            }
            Err(e) => {
                tracing::warn!(prompt_id = %remote_id, error = %e, "Queue read failed, keeping job running");
                StatusReport::running(None)
            }
        }
    }

    async fn fetch_image(&self, remote_id: &str) -> Option<FetchedImage> {
        let fetched = retry_fixed(&self.retry, |attempt| self.try_fetch(remote_id, attempt)).await;
        if fetched.is_none() {
            tracing::warn!(
                prompt_id = %remote_id,
                attempts = self.retry.attempts,
                "No output image after all attempts",
            );
        }
        fetched
    }
}
