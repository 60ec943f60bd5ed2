//! Live progress tracking over the ComfyUI WebSocket.
//!
//! [`stream_progress`] reads frames from a [`ComfyUIConnection`] and writes
//! per-prompt step progress into a shared [`ProgressBoard`]. Status polling
//! reads the board to report a fraction for running prompts. The stream is
//! advisory: it stops on transport error or close and is not reconnected.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::ComfyUIConnection;
use crate::messages::{parse_message, ComfyUIMessage};

/// Last known progress of one prompt.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PromptProgress {
    /// `value / max` of the most recent progress event.
    pub fraction: f32,
    /// Set when the server reported the prompt's execution as finished.
    pub finished: bool,
}

/// Shared prompt id -> progress map. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    inner: Arc<RwLock<HashMap<String, PromptProgress>>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, prompt_id: &str) -> Option<PromptProgress> {
        self.inner.read().await.get(prompt_id).copied()
    }

    /// Start tracking `prompt_id` at 0%. Only tracked prompts take updates,
    /// so frames arriving after [`ProgressBoard::remove`] are ignored.
    pub async fn begin(&self, prompt_id: &str) {
        self.inner
            .write()
            .await
            .insert(prompt_id.to_string(), PromptProgress::default());
    }

    pub async fn set_fraction(&self, prompt_id: &str, fraction: f32) {
        if let Some(entry) = self.inner.write().await.get_mut(prompt_id) {
            entry.fraction = fraction.clamp(0.0, 1.0);
        }
    }

    pub async fn mark_finished(&self, prompt_id: &str) {
        if let Some(entry) = self.inner.write().await.get_mut(prompt_id) {
            entry.finished = true;
            entry.fraction = 1.0;
        }
    }

    /// Drop a prompt once its job reached a terminal state.
    pub async fn remove(&self, prompt_id: &str) {
        self.inner.write().await.remove(prompt_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Consume messages until the socket closes, errors, or `cancel` fires.
pub async fn stream_progress(
    conn: &mut ComfyUIConnection,
    board: &ProgressBoard,
    cancel: &CancellationToken,
) {
    // Progress frames from older servers carry no prompt id; attribute them
    // to the prompt named by the last execution event.
    let mut current_prompt: Option<String> = None;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(client_id = %conn.client_id, "Progress stream cancelled");
                break;
            }
            next = conn.ws_stream.next() => next,
        };

        let Some(msg_result) = next else {
            tracing::info!(client_id = %conn.client_id, "ComfyUI WebSocket stream ended");
            break;
        };

        match msg_result {
            Ok(Message::Text(text)) => match parse_message(&text) {
                Ok(msg) => apply_message(&msg, &mut current_prompt, board).await,
                Err(e) => {
                    tracing::trace!(error = %e, "Skipping unhandled ComfyUI message");
                }
            },
            Ok(Message::Binary(_)) => {
                // Latent previews.
                tracing::trace!("Ignoring binary preview frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "ComfyUI WebSocket closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "ComfyUI WebSocket receive error, progress stream stopped");
                break;
            }
        }
    }
}

/// Apply one parsed message to the board.
pub async fn apply_message(
    msg: &ComfyUIMessage,
    current_prompt: &mut Option<String>,
    board: &ProgressBoard,
) {
    match msg {
        ComfyUIMessage::ExecutionStart(data) => {
            tracing::debug!(prompt_id = %data.prompt_id, "Execution started");
            *current_prompt = Some(data.prompt_id.clone());
            board.begin(&data.prompt_id).await;
        }
        ComfyUIMessage::Executing(data) => {
            let prompt_id = data.prompt_id.clone().or_else(|| current_prompt.clone());
            match (&data.node, prompt_id) {
                (None, Some(prompt_id)) => {
                    tracing::debug!(prompt_id = %prompt_id, "Execution finished");
                    board.mark_finished(&prompt_id).await;
                    *current_prompt = None;
                }
                (Some(_), Some(prompt_id)) => *current_prompt = Some(prompt_id),
                (_, None) => {}
            }
        }
        ComfyUIMessage::Progress(data) => {
            let Some(prompt_id) = data.prompt_id.as_ref().or(current_prompt.as_ref()) else {
                return;
            };
            tracing::trace!(
                prompt_id = %prompt_id,
                value = data.value,
                max = data.max,
                "Generation progress",
            );
            board.set_fraction(prompt_id, data.fraction()).await;
        }
        ComfyUIMessage::ExecutionSuccess(data) => {
            board.mark_finished(&data.prompt_id).await;
        }
        ComfyUIMessage::ExecutionError(data) => {
            tracing::warn!(
                prompt_id = %data.prompt_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "Execution error reported over WebSocket",
            );
        }
        ComfyUIMessage::ExecutionInterrupted(data) => {
            tracing::info!(prompt_id = %data.prompt_id, "Execution interrupted");
        }
        ComfyUIMessage::ExecutionCached(_) => {}
        ComfyUIMessage::Status(data) => {
            tracing::trace!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "ComfyUI queue status",
            );
        }
    }
}
