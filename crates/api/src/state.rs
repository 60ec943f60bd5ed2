use std::sync::Arc;

use zenith_comfyui::api::ComfyUIApi;
use zenith_comfyui::backend::GenerationBackend;
use zenith_events::{NotificationBus, NotificationLog};
use zenith_monitor::ResourceSampler;
use zenith_studio::artifacts::ArtifactCopier;
use zenith_studio::presets::PresetStore;
use zenith_studio::workflows::WorkflowLibrary;
use zenith_studio::{JobQueue, QueueConfig, ResourceGuard, SharedQueue, StudioConfig};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; the queue is the only mutable piece and is shared
/// with the background ticker.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<StudioConfig>,
    pub queue: SharedQueue,
    pub guard: ResourceGuard,
    pub presets: PresetStore,
    pub workflows: WorkflowLibrary,
    /// Publishing side of transient notifications.
    pub notifications: NotificationBus,
    /// Recent notifications, filled by the recorder task.
    pub notification_log: NotificationLog,
    /// Raw ComfyUI HTTP client, used for the reachability probe.
    pub comfyui: ComfyUIApi,
}

impl AppState {
    /// Assemble the studio services from configuration and the two seams.
    pub fn new(
        config: StudioConfig,
        comfyui: ComfyUIApi,
        backend: Arc<dyn GenerationBackend>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        let notifications = NotificationBus::default();
        let queue = JobQueue::new(backend, QueueConfig::from(&config))
            .with_artifacts(ArtifactCopier::new(
                config.gallery_path.clone(),
                config.local_storage_path.clone(),
            ))
            .with_notifications(notifications.clone());

        Self {
            guard: ResourceGuard::new(sampler, config.thresholds),
            presets: PresetStore::new(config.presets_dir.clone()),
            workflows: WorkflowLibrary::new(config.workflows_dir.clone()),
            queue: SharedQueue::new(queue),
            notifications,
            notification_log: NotificationLog::default(),
            comfyui,
            config: Arc::new(config),
        }
    }
}
