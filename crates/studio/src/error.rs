use std::path::PathBuf;

use zenith_core::error::CoreError;

/// Errors from the preset store and the workflow library.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A name or file name failed validation.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid workflow: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            );
        }
        Self::Io { path, source }
    }
}
