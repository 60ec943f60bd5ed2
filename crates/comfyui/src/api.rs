//! ComfyUI's HTTP surface: `/prompt`, `/history`, `/queue` and `/view`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::history::{OutputImage, QueueSnapshot};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout used by [`ComfyUIApi::is_reachable`].
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to one ComfyUI server over HTTP.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    http: reqwest::Client,
    api_url: String,
    timeout: Duration,
}

/// Body of a `POST /prompt` acceptance.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub prompt_id: String,
    /// Queue number ComfyUI assigned; absent on some forks.
    #[serde(default)]
    pub number: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// Connection refused, DNS, timeout or an undecodable body.
    #[error("Request to ComfyUI failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("ComfyUI answered {status}: {body}")]
    Status { status: u16, body: String },
}

impl ComfyUIApi {
    /// `api_url` is the server root, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    pub fn with_client(http: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            api_url,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Server root without a trailing slash.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Queue `workflow` under `client_id` so WebSocket events for it reach
    /// that client.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let request = self
            .http
            .post(self.endpoint("prompt"))
            .json(&serde_json::json!({ "prompt": workflow, "client_id": client_id }));
        decode(self.send(request).await?).await
    }

    /// `{}` while the prompt is unfinished, `{prompt_id: {status, outputs}}`
    /// afterwards.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let request = self.http.get(self.endpoint(&format!("history/{prompt_id}")));
        decode(self.send(request).await?).await
    }

    pub async fn get_queue(&self) -> Result<QueueSnapshot, ComfyUIApiError> {
        let request = self.http.get(self.endpoint("queue"));
        decode(self.send(request).await?).await
    }

    /// Raw bytes of an output file, served by `/view`.
    pub async fn download_output(&self, image: &OutputImage) -> Result<Vec<u8>, ComfyUIApiError> {
        let request = self.http.get(self.endpoint("view")).query(&[
            ("filename", image.filename.as_str()),
            ("subfolder", image.subfolder.as_str()),
            ("type", image.kind.as_str()),
        ]);
        let bytes = self.send(request).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// `GET /queue` answered with 2xx within [`REACHABILITY_TIMEOUT`].
    pub async fn is_reachable(&self) -> bool {
        let probe = self
            .http
            .get(self.endpoint("queue"))
            .timeout(REACHABILITY_TIMEOUT)
            .send()
            .await;
        match probe {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(api_url = %self.api_url, error = %e, "ComfyUI unreachable");
                false
            }
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.api_url)
    }

    /// Send with the configured timeout; non-2xx becomes [`ComfyUIApiError::Status`].
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ComfyUIApiError> {
        let response = request.timeout(self.timeout).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.text().await {
            Ok(text) => text,
            Err(_) => String::from("<unreadable body>"),
        };
        Err(ComfyUIApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ComfyUIApiError> {
    Ok(response.json::<T>().await?)
}
