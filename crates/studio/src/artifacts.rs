//! Best-effort copies of finished images to the gallery and local storage.
//!
//! Destinations are append-only: an existing file with the same name is
//! left untouched. Each destination is independent; one failing never
//! prevents the other, and no outcome changes the job's status.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use zenith_core::job::JobResult;

/// Named copy destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Gallery,
    LocalStorage,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Gallery => "gallery",
            Self::LocalStorage => "local storage",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied(PathBuf),
    /// A file with the same name was already there.
    SkippedExisting(PathBuf),
    /// The destination directory is not configured.
    NotConfigured,
    Failed(String),
}

/// Copies a job's image to the configured destinations.
#[derive(Debug, Clone, Default)]
pub struct ArtifactCopier {
    gallery: Option<PathBuf>,
    local_storage: Option<PathBuf>,
}

impl ArtifactCopier {
    pub fn new(gallery: Option<PathBuf>, local_storage: Option<PathBuf>) -> Self {
        Self {
            gallery,
            local_storage,
        }
    }

    /// A copier with no destinations.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Copy to every destination, returning one outcome per destination.
    pub async fn copy_all(&self, result: &JobResult) -> Vec<(Destination, CopyOutcome)> {
        let mut outcomes = Vec::with_capacity(2);
        for (destination, dir) in [
            (Destination::Gallery, self.gallery.as_deref()),
            (Destination::LocalStorage, self.local_storage.as_deref()),
        ] {
            let outcome = match dir {
                Some(dir) => copy_to(dir, result).await,
                None => CopyOutcome::NotConfigured,
            };
            match &outcome {
                CopyOutcome::Copied(path) => {
                    tracing::info!(%destination, path = %path.display(), "Image copied");
                }
                CopyOutcome::SkippedExisting(path) => {
                    tracing::debug!(%destination, path = %path.display(), "Destination exists, copy skipped");
                }
                CopyOutcome::Failed(reason) => {
                    tracing::warn!(%destination, error = %reason, "Image copy failed");
                }
                CopyOutcome::NotConfigured => {}
            }
            outcomes.push((destination, outcome));
        }
        outcomes
    }
}

/// Copy one image into `dir`, preferring the backend's file on disk and
/// falling back to the downloaded bytes.
pub async fn copy_to(dir: &Path, result: &JobResult) -> CopyOutcome {
    let Some(file_name) = Path::new(&result.filename).file_name() else {
        return CopyOutcome::Failed(format!("invalid file name '{}'", result.filename));
    };
    let target = dir.join(file_name);

    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        return CopyOutcome::Failed(format!("cannot create {}: {e}", dir.display()));
    }

    let source_bytes = match &result.source_path {
        Some(source) => match tokio::fs::read(source).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(source = %source.display(), error = %e, "Source file unreadable, using downloaded bytes");
                None
            }
        },
        None => None,
    };
    let bytes = source_bytes.as_deref().unwrap_or(&result.image);

    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .await;

    let mut file = match file {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return CopyOutcome::SkippedExisting(target);
        }
        Err(e) => return CopyOutcome::Failed(format!("cannot create {}: {e}", target.display())),
    };

    if let Err(e) = file.write_all(bytes).await {
        return CopyOutcome::Failed(format!("cannot write {}: {e}", target.display()));
    }
    if let Err(e) = file.flush().await {
        return CopyOutcome::Failed(format!("cannot write {}: {e}", target.display()));
    }
    CopyOutcome::Copied(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn result(source_path: Option<PathBuf>) -> JobResult {
        JobResult {
            filename: "zen_00001_.png".into(),
            source_path,
            image: b"downloaded".to_vec(),
        }
    }

    #[tokio::test]
    async fn copies_source_file_when_present() {
        let src_dir = tempfile::tempdir().unwrap();
        let source = src_dir.path().join("zen_00001_.png");
        std::fs::write(&source, b"on disk").unwrap();
        let gallery = tempfile::tempdir().unwrap();

        let outcome = copy_to(gallery.path(), &result(Some(source))).await;
        let target = gallery.path().join("zen_00001_.png");
        assert_eq!(outcome, CopyOutcome::Copied(target.clone()));
        assert_eq!(std::fs::read(target).unwrap(), b"on disk");
    }

    #[tokio::test]
    async fn falls_back_to_downloaded_bytes() {
        let gallery = tempfile::tempdir().unwrap();
        let outcome = copy_to(gallery.path(), &result(Some(PathBuf::from("/nonexistent/x.png")))).await;
        assert_matches!(outcome, CopyOutcome::Copied(_));
        assert_eq!(
            std::fs::read(gallery.path().join("zen_00001_.png")).unwrap(),
            b"downloaded"
        );
    }

    #[tokio::test]
    async fn never_overwrites_existing_files() {
        let gallery = tempfile::tempdir().unwrap();
        let target = gallery.path().join("zen_00001_.png");
        std::fs::write(&target, b"original").unwrap();

        let outcome = copy_to(gallery.path(), &result(None)).await;
        assert_eq!(outcome, CopyOutcome::SkippedExisting(target.clone()));
        assert_eq!(std::fs::read(target).unwrap(), b"original");
    }

    #[tokio::test]
    async fn creates_missing_destination_directory() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        assert_matches!(copy_to(&nested, &result(None)).await, CopyOutcome::Copied(_));
    }

    #[tokio::test]
    async fn destinations_are_independent() {
        let root = tempfile::tempdir().unwrap();
        // A regular file where a directory is expected makes the gallery fail.
        let blocked = root.path().join("blocked");
        std::fs::write(&blocked, b"").unwrap();
        let storage = root.path().join("storage");

        let copier = ArtifactCopier::new(Some(blocked), Some(storage.clone()));
        let outcomes = copier.copy_all(&result(None)).await;

        assert_matches!(outcomes[0], (Destination::Gallery, CopyOutcome::Failed(_)));
        assert_matches!(outcomes[1], (Destination::LocalStorage, CopyOutcome::Copied(_)));
        assert!(storage.join("zen_00001_.png").exists());
    }

    #[tokio::test]
    async fn unconfigured_destinations_are_skipped() {
        let outcomes = ArtifactCopier::disabled().copy_all(&result(None)).await;
        assert!(outcomes.iter().all(|(_, o)| *o == CopyOutcome::NotConfigured));
    }
}
