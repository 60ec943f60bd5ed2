//! Studio configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use zenith_comfyui::retry::FetchRetryConfig;
use zenith_core::resources::OverloadThresholds;

/// An environment variable held a value that could not be used.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Everything the queue, guard and stores need to run.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    /// ComfyUI HTTP base URL (default: `http://127.0.0.1:8188`).
    pub comfyui_url: String,
    /// ComfyUI installation directory; `models/` and `output/` live under it.
    pub base_path: Option<PathBuf>,
    /// Extra copy destination for finished images.
    pub gallery_path: Option<PathBuf>,
    /// Second copy destination for finished images.
    pub local_storage_path: Option<PathBuf>,
    pub workflows_dir: PathBuf,
    pub presets_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    pub completed_job_ttl: Duration,
    pub fetch_retry: FetchRetryConfig,
    pub submit_timeout: Duration,
    pub tick_interval: Duration,
    pub thresholds: OverloadThresholds,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            comfyui_url: "http://127.0.0.1:8188".into(),
            base_path: None,
            gallery_path: None,
            local_storage_path: None,
            workflows_dir: PathBuf::from("workflows/API"),
            presets_dir: PathBuf::from("presets"),
            max_concurrent_jobs: 5,
            completed_job_ttl: Duration::from_secs(300),
            fetch_retry: FetchRetryConfig::default(),
            submit_timeout: Duration::from_secs(10),
            tick_interval: Duration::from_millis(1000),
            thresholds: OverloadThresholds::default(),
        }
    }
}

impl StudioConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `COMFYUI_URL`            | `http://127.0.0.1:8188`  |
    /// | `COMFYUI_BASE_PATH`      | unset                    |
    /// | `GALLERY_PATH`           | unset                    |
    /// | `LOCAL_STORAGE_PATH`     | unset                    |
    /// | `WORKFLOWS_DIR`          | `workflows/API`          |
    /// | `PRESETS_DIR`            | `presets`                |
    /// | `MAX_CONCURRENT_JOBS`    | `5`                      |
    /// | `COMPLETED_JOB_TTL_SECS` | `300`                    |
    /// | `FETCH_RETRY_ATTEMPTS`   | `8`                      |
    /// | `FETCH_RETRY_DELAY_MS`   | `1000`                   |
    /// | `SUBMIT_TIMEOUT_SECS`    | `10`                     |
    /// | `TICK_INTERVAL_MS`       | `1000`                   |
    /// | `CPU_THRESHOLD`          | `80`                     |
    /// | `RAM_THRESHOLD`          | `85`                     |
    /// | `GPU_THRESHOLD`          | `90`                     |
    ///
    /// Blank path variables count as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let path = |key: &str| get(key).map(PathBuf::from);

        let comfyui_url = get("COMFYUI_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.comfyui_url);
        if !comfyui_url.starts_with("http://") && !comfyui_url.starts_with("https://") {
            return Err(ConfigError {
                var: "COMFYUI_URL",
                value: comfyui_url,
                reason: "must start with http:// or https://".into(),
            });
        }

        let max_concurrent_jobs: usize = parse(&get, "MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?;
        if max_concurrent_jobs == 0 {
            return Err(ConfigError {
                var: "MAX_CONCURRENT_JOBS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let fetch_retry = FetchRetryConfig {
            attempts: parse(&get, "FETCH_RETRY_ATTEMPTS", defaults.fetch_retry.attempts)?,
            delay: Duration::from_millis(parse(
                &get,
                "FETCH_RETRY_DELAY_MS",
                defaults.fetch_retry.delay.as_millis() as u64,
            )?),
        };

        let thresholds = OverloadThresholds {
            cpu_percent: percent(&get, "CPU_THRESHOLD", defaults.thresholds.cpu_percent)?,
            ram_percent: percent(&get, "RAM_THRESHOLD", defaults.thresholds.ram_percent)?,
            gpu_percent: percent(&get, "GPU_THRESHOLD", defaults.thresholds.gpu_percent)?,
        };

        Ok(Self {
            comfyui_url,
            base_path: path("COMFYUI_BASE_PATH"),
            gallery_path: path("GALLERY_PATH"),
            local_storage_path: path("LOCAL_STORAGE_PATH"),
            workflows_dir: path("WORKFLOWS_DIR").unwrap_or(defaults.workflows_dir),
            presets_dir: path("PRESETS_DIR").unwrap_or(defaults.presets_dir),
            max_concurrent_jobs,
            completed_job_ttl: Duration::from_secs(parse(
                &get,
                "COMPLETED_JOB_TTL_SECS",
                defaults.completed_job_ttl.as_secs(),
            )?),
            fetch_retry,
            submit_timeout: Duration::from_secs(parse(
                &get,
                "SUBMIT_TIMEOUT_SECS",
                defaults.submit_timeout.as_secs(),
            )?),
            tick_interval: Duration::from_millis(parse(
                &get,
                "TICK_INTERVAL_MS",
                defaults.tick_interval.as_millis() as u64,
            )?),
            thresholds,
        })
    }

    /// `<base>/models`, where model categories are scanned.
    pub fn models_dir(&self) -> Option<PathBuf> {
        self.base_path.as_ref().map(|base| base.join("models"))
    }

    /// `<base>/output`, where the backend writes generated images.
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.base_path.as_ref().map(|base| base.join("output"))
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError {
            var,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn percent(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: f32) -> Result<f32, ConfigError> {
    let value: f32 = parse(get, var, default)?;
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ConfigError {
            var,
            value: value.to_string(),
            reason: "must be a percentage between 0 and 100".into(),
        });
    }
    Ok(value)
}
