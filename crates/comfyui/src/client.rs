//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the connection configuration for one ComfyUI
//! server. Call [`ComfyUIClient::connect`] to open a live
//! [`ComfyUIConnection`] that receives progress events for a client id.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// The raw WebSocket stream type used by [`ComfyUIConnection`].
pub type ComfyUIStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for a ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
    api_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Client id sent during the handshake. Prompts submitted with the same
    /// id have their progress events routed to this connection.
    pub client_id: String,
    pub ws_stream: ComfyUIStream,
}

impl std::fmt::Debug for ComfyUIConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComfyUIConnection")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The HTTP base URL has no `http://` or `https://` scheme.
    #[error("Unsupported URL scheme in '{0}'")]
    UnsupportedScheme(String),
}

impl ComfyUIClient {
    /// * `ws_url`  - WebSocket base URL, e.g. `ws://host:8188`.
    /// * `api_url` - HTTP base URL, e.g. `http://host:8188`.
    pub fn new(ws_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Derive the WebSocket URL from an HTTP base URL
    /// (`http` becomes `ws`, `https` becomes `wss`).
    pub fn from_api_url(api_url: &str) -> Result<Self, ComfyUIClientError> {
        let ws_url = if let Some(rest) = api_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if let Some(rest) = api_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            return Err(ComfyUIClientError::UnsupportedScheme(api_url.to_string()));
        };
        Ok(Self::new(ws_url, api_url))
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Connect to `/ws?clientId={client_id}`.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}
