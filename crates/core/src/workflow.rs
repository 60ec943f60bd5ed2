//! ComfyUI workflow graph and the editing operations applied before submission.
//!
//! A [`Workflow`] is the API-format graph: a JSON object mapping node ids to
//! node definitions (`class_type`, `inputs`, optional `_meta.title`). The
//! editing helpers here are pure graph mutations; the queue only ever sees
//! the finished graph.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Node vocabulary
// ---------------------------------------------------------------------------

/// Substring identifying sampler nodes (`KSampler`, `KSamplerAdvanced`, ...).
const KSAMPLER_MARKER: &str = "KSampler";

/// CLIP text encode node class type.
const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";

/// Empty latent image node class type.
const EMPTY_LATENT_CLASS: &str = "EmptyLatentImage";

/// Class type used for inserted LoRA nodes.
const LORA_LOADER_CLASS: &str = "LoraLoader";

/// Input key holding a checkpoint reference.
pub const INPUT_CKPT_NAME: &str = "ckpt_name";
/// Input key holding a LoRA reference.
pub const INPUT_LORA_NAME: &str = "lora_name";
/// Input key holding a VAE reference.
pub const INPUT_VAE_NAME: &str = "vae_name";

/// Default model/clip strength for inserted LoRA nodes.
pub const DEFAULT_LORA_STRENGTH: f64 = 0.8;

// ---------------------------------------------------------------------------
// Turbo mode
// ---------------------------------------------------------------------------

/// Step count forced by turbo mode.
pub const TURBO_STEPS: u64 = 12;
/// Turbo mode only lowers step counts above this value.
pub const TURBO_STEP_THRESHOLD: u64 = 20;
/// Sampler forced by turbo mode.
pub const TURBO_SAMPLER: &str = "euler";
/// Scheduler forced by turbo mode.
pub const TURBO_SCHEDULER: &str = "simple";

/// Samplers offered by the editor.
pub const COMMON_SAMPLERS: &[&str] = &[
    "euler",
    "euler_ancestral",
    "dpmpp_2s_ancestral",
    "dpmpp_2m_sde",
    "ddim",
    "lcm",
];

/// Schedulers offered by the editor.
pub const COMMON_SCHEDULERS: &[&str] = &["normal", "karras", "exponential", "simple", "ddim_uniform"];

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// An API-format ComfyUI workflow graph.
///
/// Cloning produces a deep copy; the queue relies on this to snapshot the
/// editor's graph at enqueue time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workflow(Map<String, Value>);

/// One model reference found in a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSelection {
    pub node_id: String,
    /// `ckpt_name`, `lora_name` or `vae_name`.
    pub input_key: String,
    pub value: String,
}

/// Node ids of the positive and negative prompt encoders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptNodes {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
}

/// Sampler overrides. `None` leaves the current value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplerSettings {
    pub sampler_name: Option<String>,
    pub scheduler: Option<String>,
    pub seed: Option<u64>,
    pub steps: Option<u64>,
    pub cfg: Option<f64>,
}

/// Latent image overrides. `None` leaves the current value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatentSize {
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub batch_size: Option<u64>,
}

/// The main models a workflow uses, for preset previews.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    pub checkpoint: Option<String>,
    pub vae: Option<String>,
    pub loras: Vec<String>,
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

fn inputs_of(node: &Value) -> Option<&Map<String, Value>> {
    node.get("inputs").and_then(Value::as_object)
}

fn class_type_of(node: &Value) -> &str {
    node.get("class_type").and_then(Value::as_str).unwrap_or("")
}

fn title_of(node: &Value) -> String {
    node.get("_meta")
        .and_then(|m| m.get("title"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_lowercase()
}

fn has_input(node: &Value, key: &str) -> bool {
    inputs_of(node).is_some_and(|inputs| inputs.contains_key(key))
}

fn is_sampler(node: &Value) -> bool {
    class_type_of(node).contains(KSAMPLER_MARKER)
}

/// Source node id of a link input such as `"model": ["4", 0]`.
fn link_source<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    inputs_of(node)?
        .get(key)?
        .as_array()?
        .first()?
        .as_str()
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

impl Workflow {
    /// Build a workflow from parsed JSON. Only JSON objects are accepted.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::Validation(format!(
                "Workflow must be a JSON object mapping node ids to nodes, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse a workflow from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("Invalid workflow JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn node(&self, node_id: &str) -> Option<&Value> {
        self.0.get(node_id)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Set a single input on a node.
    pub fn set_input(&mut self, node_id: &str, key: &str, value: Value) -> Result<(), CoreError> {
        let inputs = self
            .0
            .get_mut(node_id)
            .and_then(|node| node.get_mut("inputs"))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| CoreError::NotFound {
                entity: "workflow node",
                id: node_id.to_string(),
            })?;
        inputs.insert(key.to_string(), value);
        Ok(())
    }

    /// Every checkpoint, LoRA and VAE reference in document order.
    pub fn model_selections(&self) -> Vec<ModelSelection> {
        let mut selections = Vec::new();
        for (node_id, node) in self.nodes() {
            let Some(inputs) = inputs_of(node) else {
                continue;
            };
            for key in [INPUT_CKPT_NAME, INPUT_LORA_NAME, INPUT_VAE_NAME] {
                if let Some(value) = inputs.get(key).and_then(Value::as_str) {
                    selections.push(ModelSelection {
                        node_id: node_id.clone(),
                        input_key: key.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
        selections
    }

    /// Locate the prompt encoders.
    ///
    /// Nodes are matched by `_meta.title` containing "positive" / "negative".
    /// When no titled encoder exists, the first sampler's `positive` and
    /// `negative` links are followed instead.
    pub fn prompt_nodes(&self) -> PromptNodes {
        let mut prompts = PromptNodes::default();
        for (node_id, node) in self.nodes() {
            if class_type_of(node) != CLIP_TEXT_ENCODE_CLASS {
                continue;
            }
            let title = title_of(node);
            if title.contains("positive") {
                prompts.positive.push(node_id.clone());
            } else if title.contains("negative") {
                prompts.negative.push(node_id.clone());
            }
        }

        if prompts.positive.is_empty() && prompts.negative.is_empty() {
            if let Some((_, sampler)) = self.nodes().find(|(_, n)| is_sampler(n)) {
                if let Some(id) = link_source(sampler, "positive") {
                    if self.0.contains_key(id) {
                        prompts.positive.push(id.to_string());
                    }
                }
                if let Some(id) = link_source(sampler, "negative") {
                    if self.0.contains_key(id) {
                        prompts.negative.push(id.to_string());
                    }
                }
            }
        }
        prompts
    }

    /// Replace the text of the positive and/or negative prompt encoders.
    pub fn set_prompts(&mut self, positive: Option<&str>, negative: Option<&str>) {
        let prompts = self.prompt_nodes();
        if let Some(text) = positive {
            for id in &prompts.positive {
                let _ = self.set_input(id, "text", Value::String(text.to_string()));
            }
        }
        if let Some(text) = negative {
            for id in &prompts.negative {
                let _ = self.set_input(id, "text", Value::String(text.to_string()));
            }
        }
    }

    /// Blank every node titled as a positive prompt. Applied when a preset
    /// is loaded so the saved subject does not leak into the next job.
    pub fn clear_positive_prompts(&mut self) {
        let ids: Vec<String> = self
            .nodes()
            .filter(|(_, n)| title_of(n).contains("positive") && has_input(n, "text"))
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            let _ = self.set_input(&id, "text", Value::String(String::new()));
        }
    }

    /// Apply sampler overrides to the first sampler node.
    pub fn apply_sampler_settings(&mut self, settings: &SamplerSettings) -> Result<(), CoreError> {
        let id = self
            .first_node_id(is_sampler)
            .ok_or_else(|| CoreError::Validation("Workflow has no KSampler node".to_string()))?;

        if let Some(ref sampler) = settings.sampler_name {
            self.set_input(&id, "sampler_name", json!(sampler))?;
        }
        if let Some(ref scheduler) = settings.scheduler {
            self.set_input(&id, "scheduler", json!(scheduler))?;
        }
        if let Some(seed) = settings.seed {
            self.set_input(&id, "seed", json!(seed))?;
        }
        if let Some(steps) = settings.steps {
            self.set_input(&id, "steps", json!(steps))?;
        }
        if let Some(cfg) = settings.cfg {
            self.set_input(&id, "cfg", json!(cfg))?;
        }
        Ok(())
    }

    /// Apply latent size overrides to the first `EmptyLatentImage` node.
    pub fn apply_latent_size(&mut self, size: &LatentSize) -> Result<(), CoreError> {
        let id = self
            .first_node_id(|n| class_type_of(n) == EMPTY_LATENT_CLASS)
            .ok_or_else(|| {
                CoreError::Validation("Workflow has no EmptyLatentImage node".to_string())
            })?;

        if let Some(width) = size.width {
            self.set_input(&id, "width", json!(width))?;
        }
        if let Some(height) = size.height {
            self.set_input(&id, "height", json!(height))?;
        }
        if let Some(batch) = size.batch_size {
            self.set_input(&id, "batch_size", json!(batch))?;
        }
        Ok(())
    }

    /// Insert a `LoraLoader` node and splice it into the model chain.
    ///
    /// The new node takes its model/clip from the end of the existing LoRA
    /// chain, or from the first checkpoint loader when there is no LoRA yet.
    /// Samplers that consumed that source are rewired to the new node.
    /// Returns the id of the inserted node.
    pub fn add_lora(&mut self, lora_name: &str) -> Result<String, CoreError> {
        let sampler_ids: Vec<String> = self
            .nodes()
            .filter(|(_, n)| is_sampler(n))
            .map(|(id, _)| id.clone())
            .collect();
        if sampler_ids.is_empty() {
            return Err(CoreError::Validation(
                "Cannot add a LoRA: workflow has no KSampler node".to_string(),
            ));
        }

        let new_id = self.next_node_id()?;

        let lora_ids: Vec<String> = self
            .nodes()
            .filter(|(_, n)| has_input(n, INPUT_LORA_NAME))
            .map(|(id, _)| id.clone())
            .collect();

        let source_id = if lora_ids.is_empty() {
            self.first_node_id(|n| has_input(n, INPUT_CKPT_NAME))
                .ok_or_else(|| {
                    CoreError::Validation(
                        "Cannot add a LoRA: workflow has no checkpoint loader".to_string(),
                    )
                })?
        } else {
            let feeding: HashSet<&str> = lora_ids
                .iter()
                .filter_map(|id| self.node(id).and_then(|n| link_source(n, "model")))
                .collect();
            lora_ids
                .iter()
                .find(|id| !feeding.contains(id.as_str()))
                .unwrap_or(&lora_ids[0])
                .clone()
        };

        self.0.insert(
            new_id.clone(),
            json!({
                "inputs": {
                    "model": [source_id, 0],
                    "clip": [source_id, 1],
                    "lora_name": lora_name,
                    "strength_model": DEFAULT_LORA_STRENGTH,
                    "strength_clip": DEFAULT_LORA_STRENGTH,
                },
                "class_type": LORA_LOADER_CLASS,
                "_meta": { "title": "LoRA" },
            }),
        );

        for sampler_id in sampler_ids {
            let consumes_source = self
                .node(&sampler_id)
                .and_then(|n| link_source(n, "model"))
                == Some(source_id.as_str());
            if consumes_source {
                self.set_input(&sampler_id, "model", json!([new_id, 0]))?;
            }
        }

        Ok(new_id)
    }

    /// Force a fast sampler on every sampling node.
    ///
    /// Every node with a `sampler_name` input gets `sampler` / `scheduler`;
    /// step counts above `threshold` are lowered to `steps`.
    pub fn apply_turbo_mode(&mut self, steps: u64, threshold: u64) {
        for node in self.0.values_mut() {
            let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) else {
                continue;
            };
            if !inputs.contains_key("sampler_name") {
                continue;
            }
            inputs.insert("sampler_name".to_string(), json!(TURBO_SAMPLER));
            inputs.insert("scheduler".to_string(), json!(TURBO_SCHEDULER));
            let current = inputs.get("steps").and_then(Value::as_u64).unwrap_or(0);
            if current > threshold {
                inputs.insert("steps".to_string(), json!(steps));
            }
        }
    }

    /// Checkpoint, VAE and LoRAs used by the workflow.
    pub fn summarize(&self) -> WorkflowSummary {
        let mut summary = WorkflowSummary::default();
        for selection in self.model_selections() {
            match selection.input_key.as_str() {
                INPUT_CKPT_NAME if summary.checkpoint.is_none() => {
                    summary.checkpoint = Some(selection.value);
                }
                INPUT_VAE_NAME if summary.vae.is_none() => summary.vae = Some(selection.value),
                INPUT_LORA_NAME => summary.loras.push(selection.value),
                _ => {}
            }
        }
        summary
    }

    // ---- private helpers ----

    fn first_node_id(&self, predicate: impl Fn(&Value) -> bool) -> Option<String> {
        self.nodes()
            .find(|(_, n)| predicate(n))
            .map(|(id, _)| id.clone())
    }

    /// One past the highest numeric node id.
    fn next_node_id(&self) -> Result<String, CoreError> {
        self.0
            .keys()
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
            .map(|max| (max + 1).to_string())
            .ok_or_else(|| {
                CoreError::Validation("Workflow has no numeric node ids".to_string())
            })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
