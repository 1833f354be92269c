//! Error types for lifecycle operations

/// Errors from session refresh.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A fresh login produced the same credentials; retrying cannot help
    #[error("reauthentication suppressed: credentials unchanged after relogin")]
    ReauthSuppressed,

    #[error("relogin failed: {0}")]
    Relogin(String),

    #[error("persisting refreshed session failed: {0}")]
    Persist(String),
}

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
