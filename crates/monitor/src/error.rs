use std::path::PathBuf;

/// Errors from host resource sampling.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// The platform has no supported sensor source.
    #[error("Resource sampling unsupported: {0}")]
    Unsupported(&'static str),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected sensor data: {0}")]
    Parse(String),
}
