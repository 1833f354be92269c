//! Error types for site authentication

use std::path::PathBuf;

/// Errors from credential resolution, login, and session capture.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No explicit value and no resolver could supply the labelled secret
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    #[error("invalid TOTP secret: {0}")]
    InvalidTotpSecret(String),

    /// Step budget exhausted before the session landed on the target host
    #[error("login did not complete after {steps} steps (screenshot: {})", screenshot.display())]
    LoginTimeout { steps: u32, screenshot: PathBuf },

    #[error("browser error: {0}")]
    Browser(#[from] browser::Error),

    #[error("traffic capture failed: {0}")]
    Capture(#[from] capture::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("session artifact parse error: {0}")]
    SessionParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
