//! Model catalog scanning.
//!
//! Walks `<models_dir>/<category>` recursively and registers every file
//! with a model extension under its `/`-separated path relative to the
//! category folder. Missing folders yield empty categories; unreadable
//! entries are logged and skipped.

use std::path::Path;

use zenith_core::catalog::{is_model_file, ModelCatalog, ModelCategory};

/// Scan all categories under `models_dir`. Not cached.
pub async fn scan_models(models_dir: &Path) -> ModelCatalog {
    let mut catalog = ModelCatalog::new();
    for category in ModelCategory::ALL {
        let root = models_dir.join(category.dir_name());
        if !tokio::fs::try_exists(&root).await.unwrap_or(false) {
            tracing::debug!(category = %category, path = %root.display(), "Model folder missing");
            continue;
        }
        scan_recursive(&root, &root, category, &mut catalog).await;
    }
    tracing::debug!(models = catalog.len(), "Model catalog scanned");
    catalog
}

async fn scan_recursive(root: &Path, dir: &Path, category: ModelCategory, catalog: &mut ModelCatalog) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "Cannot read model folder");
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Cannot list model folder");
                break;
            }
        };

        let path = entry.path();
        let is_dir = match entry.file_type().await {
            Ok(file_type) => file_type.is_dir(),
            Err(_) => continue,
        };

        if is_dir {
            Box::pin(scan_recursive(root, &path, category, catalog)).await;
        } else if is_model_file(&path) {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let file_name = entry.file_name().to_string_lossy().into_owned();
            catalog.insert(category, &relative.to_string_lossy(), &file_name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[tokio::test]
    async fn scans_categories_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let models = dir.path();
        touch(&models.join("checkpoints/sdxl/base.safetensors"));
        touch(&models.join("checkpoints/old.ckpt"));
        touch(&models.join("checkpoints/readme.txt"));
        touch(&models.join("loras/style/ink.safetensors"));
        touch(&models.join("vae/ae.pt"));

        let catalog = scan_models(models).await;

        assert!(catalog.contains(ModelCategory::Checkpoints, "sdxl/base.safetensors"));
        assert!(catalog.contains(ModelCategory::Checkpoints, "old.ckpt"));
        assert!(!catalog.contains(ModelCategory::Checkpoints, "readme.txt"));
        assert!(catalog.contains(ModelCategory::Loras, "style/ink.safetensors"));
        assert!(catalog.contains(ModelCategory::Vae, "ae.pt"));
        assert_eq!(catalog.len(), 4);
        assert_eq!(
            catalog.models(ModelCategory::Loras).unwrap()["style/ink.safetensors"],
            "ink.safetensors"
        );
    }

    #[tokio::test]
    async fn missing_folders_give_empty_categories() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("loras/a.bin"));
        let catalog = scan_models(dir.path()).await;
        assert_eq!(catalog.len(), 1);
        assert!(catalog.models(ModelCategory::Checkpoints).unwrap().is_empty());
    }

    #[tokio::test]
    async fn nonexistent_models_dir_is_empty() {
        let catalog = scan_models(Path::new("/definitely/not/here")).await;
        assert!(catalog.is_empty());
    }
}
