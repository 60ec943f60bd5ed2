//! Frames pushed over the `/ws` socket.
//!
//! Every text frame is `{"type": "<kind>", "data": {...}}`. Only the kinds
//! progress tracking reads are modelled.

use serde::Deserialize;

/// Known ComfyUI WebSocket message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Server status broadcast (queue depth).
    #[serde(rename = "status")]
    Status(StatusData),

    #[serde(rename = "execution_start")]
    ExecutionStart(PromptRef),

    /// Cached nodes were skipped.
    #[serde(rename = "execution_cached")]
    ExecutionCached(PromptRef),

    /// A node started executing, or the prompt finished when `node` is null.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step-level progress from a long-running node (e.g. KSampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    #[serde(rename = "execution_success")]
    ExecutionSuccess(PromptRef),

    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),

    #[serde(rename = "execution_interrupted")]
    ExecutionInterrupted(PromptRef),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i64,
}

/// Payload carrying only the prompt id.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    /// Older servers omit the prompt id.
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i64,
    pub max: i64,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

impl ProgressData {
    /// `value / max` clamped to `[0, 1]`; zero when `max` is not positive.
    pub fn fraction(&self) -> f32 {
        if self.max <= 0 {
            return 0.0;
        }
        (self.value as f32 / self.max as f32).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

/// Decode one text frame. Unknown kinds (`crystools.monitor`, previews and
/// the like) are errors the caller skips.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_status_message() {
        let json = r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":3}},"sid":"x"}}"#;
        assert_matches!(
            parse_message(json).unwrap(),
            ComfyUIMessage::Status(data) if data.status.exec_info.queue_remaining == 3
        );
    }

    #[test]
    fn executing_with_null_node_marks_prompt_done() {
        let json = r#"{"type":"executing","data":{"node":null,"prompt_id":"p-17"}}"#;
        assert_matches!(
            parse_message(json).unwrap(),
            ComfyUIMessage::Executing(ExecutingData { node: None, prompt_id: Some(id) }) if id == "p-17"
        );
    }

    #[test]
    fn parse_executing_without_prompt_id() {
        let json = r#"{"type":"executing","data":{"node":"4"}}"#;
        assert_matches!(
            parse_message(json).unwrap(),
            ComfyUIMessage::Executing(ExecutingData { prompt_id: None, .. })
        );
    }

    #[test]
    fn parse_progress_with_prompt_id() {
        let json = r#"{"type":"progress","data":{"value":5,"max":20,"prompt_id":"abc","node":"3"}}"#;
        match parse_message(json).unwrap() {
            ComfyUIMessage::Progress(data) => {
                assert_eq!(data.prompt_id.as_deref(), Some("abc"));
                assert_eq!(data.fraction(), 0.25);
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn progress_fraction_guards_zero_max() {
        let data = ProgressData {
            value: 3,
            max: 0,
            prompt_id: None,
            node: None,
        };
        assert_eq!(data.fraction(), 0.0);
    }

    #[test]
    fn execution_error_carries_exception() {
        let json = r#"{"type":"execution_error","data":{"prompt_id":"p-9","node_id":"12","exception_message":"CUDA error: device-side assert","exception_type":"RuntimeError"}}"#;
        let ComfyUIMessage::ExecutionError(data) = parse_message(json).unwrap() else {
            panic!("expected an execution_error message");
        };
        assert_eq!(data.node_id.as_deref(), Some("12"));
        assert!(data.exception_message.starts_with("CUDA error"));
    }

    #[test]
    fn parse_execution_success() {
        let json = r#"{"type":"execution_success","data":{"prompt_id":"abc","timestamp":1}}"#;
        assert_matches!(
            parse_message(json).unwrap(),
            ComfyUIMessage::ExecutionSuccess(PromptRef { prompt_id }) if prompt_id == "abc"
        );
    }

    #[test]
    fn unknown_type_and_bad_json_are_errors() {
        assert!(parse_message(r#"{"type":"crystools.monitor","data":{}}"#).is_err());
        assert!(parse_message("not json at all").is_err());
    }
}
