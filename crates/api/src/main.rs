use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zenith_api::background::{progress_listener, queue_ticker};
use zenith_api::config::ServerConfig;
use zenith_api::router::build_app_router;
use zenith_api::state::AppState;
use zenith_comfyui::api::ComfyUIApi;
use zenith_comfyui::backend::ComfyUIBackend;
use zenith_comfyui::client::ComfyUIClient;
use zenith_comfyui::progress::ProgressBoard;
use zenith_monitor::HostMonitor;
use zenith_studio::StudioConfig;

/// How long shutdown waits for each background task.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "zenith_api=debug,zenith_studio=debug,zenith_comfyui=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let server_config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid server configuration");
            std::process::exit(1);
        }
    };
    let studio_config = match StudioConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid studio configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(
        addr = %server_config.socket_addr(),
        comfyui_url = %studio_config.comfyui_url,
        max_concurrent_jobs = studio_config.max_concurrent_jobs,
        "Loaded configuration"
    );

    // --- ComfyUI ---
    let comfyui = ComfyUIApi::new(&studio_config.comfyui_url).with_timeout(studio_config.submit_timeout);
    let progress_board = ProgressBoard::new();
    let backend = ComfyUIBackend::new(comfyui.clone())
        .with_retry(studio_config.fetch_retry)
        .with_output_dir(studio_config.output_dir())
        .with_progress_board(progress_board.clone());

    if !comfyui.is_reachable().await {
        tracing::warn!(url = %studio_config.comfyui_url, "ComfyUI is not reachable yet; jobs will fail until it is");
    }

    // --- App state ---
    let tick_interval = studio_config.tick_interval;
    let state = AppState::new(
        studio_config,
        comfyui,
        Arc::new(backend),
        Arc::new(HostMonitor::new()),
    );
    let client_id = state.queue.lock().await.client_id().to_string();

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let recorder_handle = tokio::spawn(
        state
            .notification_log
            .clone()
            .record(state.notifications.subscribe()),
    );

    let ticker_handle = tokio::spawn(queue_ticker::run(
        state.queue.clone(),
        tick_interval,
        cancel.clone(),
    ));

    let listener_handle = match ComfyUIClient::from_api_url(state.comfyui.api_url()) {
        Ok(client) => Some(tokio::spawn(progress_listener::run(
            client,
            client_id,
            progress_board,
            cancel.clone(),
        ))),
        Err(e) => {
            tracing::warn!(error = %e, "Live progress disabled");
            None
        }
    };

    tracing::info!("Background tasks started (queue ticker, notification recorder, progress listener)");

    // --- Router ---
    let app = build_app_router(state.clone(), &server_config);

    // --- Start server ---
    let addr = server_config.socket_addr();
    tracing::info!(%addr, "Starting server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, ticker_handle).await;
    if let Some(handle) = listener_handle {
        let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await;
    }
    tracing::info!("Queue ticker and progress listener stopped");

    // Finish in-flight image fetches so their copies land on disk.
    {
        let mut queue = state.queue.lock().await;
        let pending = queue.pending_fetch_count();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight image fetches");
        }
        queue.drain_fetches().await;
    }

    // Dropping every bus sender closes the channel and ends the recorder.
    drop(state);
    let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, recorder_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
