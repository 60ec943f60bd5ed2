//! Saved workflow presets.
//!
//! Presets are pretty-printed workflow JSON files in one directory, named
//! after a slug of the user's preset name. Loading a preset clears the
//! positive prompt text so the user writes a fresh prompt.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use zenith_core::preset::{
    display_name, paginate, preset_file_name, validate_file_name, PRESETS_PER_PAGE, PRESET_EXTENSION,
};
use zenith_core::workflow::{Workflow, WorkflowSummary};

use crate::error::StoreError;

/// One preset file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetEntry {
    pub file_name: String,
    pub display_name: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresetPage {
    pub items: Vec<PresetEntry>,
    pub page: usize,
    pub total_pages: usize,
}

/// Preview of a preset: the main models it uses plus the full graph.
#[derive(Debug, Clone, Serialize)]
pub struct PresetDetails {
    pub file_name: String,
    pub display_name: String,
    pub summary: WorkflowSummary,
    pub workflow: Workflow,
}

#[derive(Debug, Clone)]
pub struct PresetStore {
    dir: PathBuf,
}

impl PresetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `workflow` under the slug of `name`, replacing a preset of the
    /// same name.
    pub async fn save(&self, name: &str, workflow: &Workflow) -> Result<PresetEntry, StoreError> {
        let file_name = preset_file_name(name)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let path = self.dir.join(&file_name);
        let body = serde_json::to_string_pretty(workflow).map_err(|e| StoreError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        tracing::info!(file_name = %file_name, "Preset saved");
        Ok(PresetEntry {
            display_name: display_name(&file_name),
            file_name,
            modified_at: Utc::now(),
        })
    }

    /// All presets, most recently modified first. A missing directory is
    /// an empty list.
    pub async fn list(&self) -> Result<Vec<PresetEntry>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut presets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.ends_with(PRESET_EXTENSION) {
                continue;
            }
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            presets.push(PresetEntry {
                display_name: display_name(&file_name),
                file_name,
                modified_at,
            });
        }

        presets.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(presets)
    }

    /// Zero-based page of [`list`](Self::list), five presets per page.
    pub async fn list_page(&self, page: usize) -> Result<PresetPage, StoreError> {
        let all = self.list().await?;
        let (items, total_pages) = paginate(&all, page, PRESETS_PER_PAGE);
        Ok(PresetPage {
            items: items.to_vec(),
            page,
            total_pages,
        })
    }

    /// Load a preset for editing, with positive prompt texts cleared.
    pub async fn load(&self, file_name: &str) -> Result<Workflow, StoreError> {
        let mut workflow = self.read(file_name).await?;
        workflow.clear_positive_prompts();
        Ok(workflow)
    }

    pub async fn details(&self, file_name: &str) -> Result<PresetDetails, StoreError> {
        let workflow = self.read(file_name).await?;
        Ok(PresetDetails {
            file_name: file_name.to_string(),
            display_name: display_name(file_name),
            summary: workflow.summarize(),
            workflow,
        })
    }

    pub async fn delete(&self, file_name: &str) -> Result<(), StoreError> {
        validate_file_name(file_name)?;
        let path = self.dir.join(file_name);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        tracing::info!(file_name = %file_name, "Preset deleted");
        Ok(())
    }

    async fn read(&self, file_name: &str) -> Result<Workflow, StoreError> {
        validate_file_name(file_name)?;
        read_workflow(&self.dir.join(file_name)).await
    }
}

/// Read and parse a workflow JSON file.
pub(crate) async fn read_workflow(path: &Path) -> Result<Workflow, StoreError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    Workflow::from_json_str(&text).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn workflow() -> Workflow {
        Workflow::from_value(json!({
            "4": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "sdxl/base.safetensors" } },
            "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "a red fox" }, "_meta": { "title": "Positive Prompt" } },
            "7": { "class_type": "CLIPTextEncode", "inputs": { "text": "blurry" }, "_meta": { "title": "Negative Prompt" } }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn save_writes_slugged_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path().join("presets"));

        let entry = store.save("Portrait Sci Fi", &workflow()).await.unwrap();
        assert_eq!(entry.file_name, "portrait_sci_fi.json");
        assert_eq!(entry.display_name, "Portrait sci fi");

        let text = std::fs::read_to_string(dir.path().join("presets/portrait_sci_fi.json")).unwrap();
        assert!(text.contains('\n'), "pretty-printed");
    }

    #[tokio::test]
    async fn load_clears_positive_prompt_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        store.save("night", &workflow()).await.unwrap();

        let loaded = store.load("night.json").await.unwrap();
        assert_eq!(loaded.node("6").unwrap()["inputs"]["text"], "");
        assert_eq!(loaded.node("7").unwrap()["inputs"]["text"], "blurry");
    }

    #[tokio::test]
    async fn details_summarize_models() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        store.save("night", &workflow()).await.unwrap();

        let details = store.details("night.json").await.unwrap();
        assert_eq!(details.summary.checkpoint.as_deref(), Some("sdxl/base.safetensors"));
        assert_eq!(details.workflow.node("6").unwrap()["inputs"]["text"], "a red fox");
    }

    #[tokio::test]
    async fn missing_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path().join("nope"));
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.list_page(0).await.unwrap().total_pages, 0);
    }

    #[tokio::test]
    async fn delete_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        store.save("night", &workflow()).await.unwrap();

        store.delete("night.json").await.unwrap();
        assert_matches!(store.delete("night.json").await, Err(StoreError::NotFound(_)));
        assert_matches!(store.load("night.json").await, Err(StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        assert_matches!(store.load("../secret.json").await, Err(StoreError::Invalid(_)));
        assert_matches!(store.save("../x", &workflow()).await, Err(StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn pages_hold_five_presets() {
        let dir = tempfile::tempdir().unwrap();
        let store = PresetStore::new(dir.path());
        for i in 0..7 {
            store.save(&format!("preset {i}"), &workflow()).await.unwrap();
        }
        let first = store.list_page(0).await.unwrap();
        assert_eq!(first.items.len(), 5);
        assert_eq!(first.total_pages, 2);
        assert_eq!(store.list_page(1).await.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn corrupt_preset_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "[1, 2]").unwrap();
        let store = PresetStore::new(dir.path());
        assert_matches!(store.load("bad.json").await, Err(StoreError::Parse { .. }));
    }
}
