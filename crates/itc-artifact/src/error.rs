//! Error types for the artifact data model

/// Errors related to requests and artifacts
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Request does not describe a usable image file
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Reading or writing a file failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
