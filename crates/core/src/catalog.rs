//! Model catalog types.
//!
//! The catalog groups on-disk model files by category. Scanning the
//! filesystem lives in `zenith-studio`; this module only holds the shape
//! and the naming rules.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::workflow::{INPUT_CKPT_NAME, INPUT_LORA_NAME, INPUT_VAE_NAME};

/// File extensions recognised as model weights.
pub const MODEL_EXTENSIONS: &[&str] = &["safetensors", "ckpt", "pt", "bin"];

/// A model category, matching the ComfyUI `models/<category>` folder layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCategory {
    Checkpoints,
    Loras,
    Vae,
}

impl ModelCategory {
    pub const ALL: [ModelCategory; 3] = [Self::Checkpoints, Self::Loras, Self::Vae];

    /// Folder name under `models/`.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Checkpoints => "checkpoints",
            Self::Loras => "loras",
            Self::Vae => "vae",
        }
    }

    /// Category referenced by a workflow node input key, if any.
    pub fn for_input_key(key: &str) -> Option<Self> {
        match key {
            INPUT_CKPT_NAME => Some(Self::Checkpoints),
            INPUT_LORA_NAME => Some(Self::Loras),
            INPUT_VAE_NAME => Some(Self::Vae),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Category -> (relative path with `/` separators -> file name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    categories: BTreeMap<ModelCategory, BTreeMap<String, String>>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCatalog {
    /// An empty catalog with every category present.
    pub fn new() -> Self {
        let categories = ModelCategory::ALL
            .iter()
            .map(|c| (*c, BTreeMap::new()))
            .collect();
        Self { categories }
    }

    /// Register a model. `relative_path` is normalised to `/` separators.
    pub fn insert(&mut self, category: ModelCategory, relative_path: &str, file_name: &str) {
        self.categories
            .entry(category)
            .or_default()
            .insert(relative_path.replace('\\', "/"), file_name.to_string());
    }

    pub fn contains(&self, category: ModelCategory, relative_path: &str) -> bool {
        self.categories
            .get(&category)
            .is_some_and(|models| models.contains_key(relative_path))
    }

    /// Models of one category, keyed by relative path.
    pub fn models(&self, category: ModelCategory) -> Option<&BTreeMap<String, String>> {
        self.categories.get(&category)
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether a path has one of the [`MODEL_EXTENSIONS`].
pub fn is_model_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MODEL_EXTENSIONS.contains(&ext))
}
