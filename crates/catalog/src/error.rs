//! Error types for catalog synthesis and persistence

/// Errors from writing or reading the catalog artifact.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog serialization failed: {0}")]
    Serialize(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;
