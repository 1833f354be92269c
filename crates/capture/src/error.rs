//! Error types for traffic capture

/// Errors from traffic capture.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A response arrived with no open request on its route. Only that one
    /// response is dropped; capture continues.
    #[error("capture gap: no open request for {0}")]
    CaptureGap(String),

    #[error("response already attached for {0}")]
    AlreadyAttached(String),

    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(String),

    #[error("interceptor task failed: {0}")]
    Task(String),
}

/// Result alias for capture operations.
pub type Result<T> = std::result::Result<T, Error>;
