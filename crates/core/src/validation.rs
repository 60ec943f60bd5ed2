//! Missing-model detection for workflows.

use serde::Serialize;
use serde_json::Value;

use crate::catalog::{ModelCatalog, ModelCategory};
use crate::workflow::Workflow;

/// A model referenced by a workflow but absent from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingModel {
    pub name: String,
    #[serde(rename = "type")]
    pub category: ModelCategory,
}

/// Report every model reference the catalog cannot satisfy.
///
/// Only string values of `ckpt_name`, `lora_name` and `vae_name` inputs are
/// considered. Entries are deduplicated by name; the first occurrence in
/// document order wins.
pub fn find_missing_models(workflow: &Workflow, catalog: &ModelCatalog) -> Vec<MissingModel> {
    let mut missing: Vec<MissingModel> = Vec::new();

    for (_, node) in workflow.nodes() {
        let Some(inputs) = node.get("inputs").and_then(Value::as_object) else {
            continue;
        };
        for (key, value) in inputs {
            let Some(category) = ModelCategory::for_input_key(key) else {
                continue;
            };
            let Some(path) = value.as_str() else {
                continue;
            };
            if catalog.contains(category, path) {
                continue;
            }
            if !missing.iter().any(|m| m.name == path) {
                missing.push(MissingModel {
                    name: path.to_string(),
                    category,
                });
            }
        }
    }

    missing
}
