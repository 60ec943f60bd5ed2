//! Base workflows shipped with the studio (`*.json` in one directory).

use std::path::{Path, PathBuf};

use zenith_core::preset::{validate_file_name, PRESET_EXTENSION};
use zenith_core::workflow::Workflow;

use crate::error::StoreError;
use crate::presets::read_workflow;

#[derive(Debug, Clone)]
pub struct WorkflowLibrary {
    dir: PathBuf,
}

impl WorkflowLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names of all base workflows, sorted by name.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %self.dir.display(), "Workflow directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(PRESET_EXTENSION) && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn load(&self, file_name: &str) -> Result<Workflow, StoreError> {
        validate_file_name(file_name)?;
        read_workflow(&self.dir.join(file_name)).await
    }
}
