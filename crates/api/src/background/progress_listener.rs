//! Live sampling progress from the ComfyUI WebSocket.
//!
//! Optional and one-shot: the socket is opened once at startup. When it is
//! unavailable or drops, the failure is logged and running jobs report the
//! last known fraction until the status poll sees them finish.

use tokio_util::sync::CancellationToken;
use zenith_comfyui::client::ComfyUIClient;
use zenith_comfyui::progress::{stream_progress, ProgressBoard};

/// Feed `board` with progress events for `client_id` until the stream ends
/// or `cancel` fires. Never reconnects.
pub async fn run(client: ComfyUIClient, client_id: String, board: ProgressBoard, cancel: CancellationToken) {
    tracing::info!(ws_url = %client.ws_url(), %client_id, "Progress listener started");

    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("Progress listener cancelled before connecting");
            return;
        }
        connected = client.connect(&client_id) => connected,
    };

    match connected {
        Ok(mut conn) => {
            stream_progress(&mut conn, &board, &cancel).await;
            if !cancel.is_cancelled() {
                tracing::warn!(%client_id, "ComfyUI progress stream closed; live progress disabled");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "ComfyUI progress stream unavailable; live progress disabled");
        }
    }

    tracing::info!("Progress listener stopped");
}
