//! Shared building blocks for the cartographer workspace
//!
//! Everything here is dependency-light so every other crate can use it:
//! a redacting secret wrapper, the configuration error type, the epoch
//! clock used to stamp artifacts, and atomic file writes.

mod clock;
mod error;
pub mod fs;
mod secret;

pub use clock::{epoch_millis, now_millis};
pub use error::{Error, Result};
pub use secret::Secret;
