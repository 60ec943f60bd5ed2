#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use zenith_api::config::ServerConfig;
use zenith_api::router::build_app_router;
use zenith_api::state::AppState;
use zenith_comfyui::api::ComfyUIApi;
use zenith_comfyui::backend::{BackendError, FetchedImage, GenerationBackend, StatusReport};
use zenith_core::resources::ResourceSample;
use zenith_core::workflow::Workflow;
use zenith_monitor::{MonitorError, ResourceSampler};
use zenith_studio::StudioConfig;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Accepts every prompt as `prompt-<n>` and keeps it running forever.
#[derive(Default)]
pub struct StubBackend {
    pub submitted: Mutex<Vec<Workflow>>,
}

#[async_trait]
impl GenerationBackend for StubBackend {
    async fn submit(&self, workflow: &Workflow, _client_id: &str) -> Result<String, BackendError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(workflow.clone());
        Ok(format!("prompt-{}", submitted.len() - 1))
    }

    async fn poll_status(&self, _remote_id: &str) -> StatusReport {
        StatusReport::running(Some(0.5))
    }

    async fn fetch_image(&self, _remote_id: &str) -> Option<FetchedImage> {
        None
    }
}

/// Always reports the given CPU load.
pub struct StubSampler {
    pub cpu_percent: f32,
}

#[async_trait]
impl ResourceSampler for StubSampler {
    async fn sample(&self) -> Result<ResourceSample, MonitorError> {
        Ok(ResourceSample {
            cpu_percent: self.cpu_percent,
            ram_percent: 30.0,
            ram_available_gb: 16.0,
            gpus: None,
        })
    }
}

// ---------------------------------------------------------------------------
// App builders
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub backend: Arc<StubBackend>,
    /// Holds presets, workflows and (optionally) models.
    pub dir: tempfile::TempDir,
}

/// A studio config rooted in `dir`, pointing ComfyUI at a closed port.
pub fn test_studio_config(dir: &std::path::Path) -> StudioConfig {
    StudioConfig {
        comfyui_url: "http://127.0.0.1:9".into(),
        workflows_dir: dir.join("workflows"),
        presets_dir: dir.join("presets"),
        ..StudioConfig::default()
    }
}

pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        host: [127, 0, 0, 1].into(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// Build the full application router with an idle host.
pub fn build_test_app() -> TestApp {
    build_test_app_with(|_| {}, 10.0)
}

/// Build the full application router, letting the caller adjust the
/// studio config and choose the sampled CPU load.
pub fn build_test_app_with(configure: impl FnOnce(&mut StudioConfig), cpu_percent: f32) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_studio_config(dir.path());
    configure(&mut config);

    let backend = Arc::new(StubBackend::default());
    let comfyui = ComfyUIApi::new(config.comfyui_url.clone());
    let state = AppState::new(
        config,
        comfyui,
        backend.clone(),
        Arc::new(StubSampler { cpu_percent }),
    );
    let router = build_app_router(state.clone(), &test_server_config());

    TestApp {
        router,
        state,
        backend,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

async fn send(app: &Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
