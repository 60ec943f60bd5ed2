//! Interpretation of `/history` and `/queue` payloads.
//!
//! History entries look like:
//!
//! ```json
//! { "<prompt_id>": {
//!     "status": { "status_str": "success", "completed": true, "messages": [["execution_start", {...}]] },
//!     "outputs": { "9": { "images": [{ "filename": "x.png", "subfolder": "", "type": "output" }] } }
//! } }
//! ```

use serde::Deserialize;
use serde_json::Value;

/// Image type the backend uses for saved results (as opposed to `temp`
/// previews).
pub const OUTPUT_IMAGE_TYPE: &str = "output";

const STATUS_ERROR: &str = "error";
const MESSAGE_EXECUTION_ERROR: &str = "execution_error";

/// What a finished history entry says about its prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    Completed,
    Failed(String),
}

/// A file reference inside a history entry's `outputs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Body of `GET /queue`. Entries are `[number, prompt_id, prompt, extra, outputs]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<Value>,
    #[serde(default)]
    pub queue_pending: Vec<Value>,
}

impl QueueSnapshot {
    /// Whether `prompt_id` is running or waiting on the backend.
    pub fn contains(&self, prompt_id: &str) -> bool {
        self.queue_running
            .iter()
            .chain(&self.queue_pending)
            .any(|entry| entry.get(1).and_then(Value::as_str) == Some(prompt_id))
    }
}

/// The entry for `prompt_id`, if the backend has recorded one.
pub fn history_entry<'a>(history: &'a Value, prompt_id: &str) -> Option<&'a Value> {
    history.get(prompt_id).filter(|entry| entry.is_object())
}

/// Classify a recorded entry.
///
/// `status_str == "error"` is a failure; the message comes from the
/// `execution_error` status message when present. Anything else recorded
/// in history has finished.
pub fn outcome(entry: &Value) -> HistoryOutcome {
    let status = entry.get("status");
    let status_str = status
        .and_then(|s| s.get("status_str"))
        .and_then(Value::as_str);

    if status_str != Some(STATUS_ERROR) {
        return HistoryOutcome::Completed;
    }

    let message = status
        .and_then(|s| s.get("messages"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|pair| pair.first().and_then(Value::as_str) == Some(MESSAGE_EXECUTION_ERROR))
        .and_then(|pair| pair.get(1))
        .and_then(|data| data.get("exception_message"))
        .and_then(Value::as_str)
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "Execution failed on the backend".to_string());

    HistoryOutcome::Failed(message)
}

/// First image with `type == "output"` across all output nodes, in
/// document order.
pub fn find_output_image(entry: &Value) -> Option<OutputImage> {
    let outputs = entry.get("outputs")?.as_object()?;
    outputs
        .values()
        .filter_map(|node_output| node_output.get("images")?.as_array())
        .flatten()
        .filter_map(|image| serde_json::from_value::<OutputImage>(image.clone()).ok())
        .find(|image| image.kind == OUTPUT_IMAGE_TYPE)
}
