//! Service-specific error types

use thiserror::Error;

/// Failures of a discovery run.
///
/// Every variant is fatal for a discovery run; degraded-but-usable outcomes
/// (capture gaps, an unverified strategy) are logged, never returned.
#[derive(Error, Debug)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] browser::Error),

    #[error("{0}")]
    Auth(#[from] site_auth::Error),

    #[error("catalog error: {0}")]
    Catalog(#[from] catalog::Error),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
