//! Session credential lifecycle
//!
//! Keeps the current `SessionSnapshot` usable after the original login
//! expires, without looping on credentials that will not change:
//!
//! 1. A caller sees 401/403 and calls `LifecycleManager::refresh_if_warranted`
//! 2. Within the cooldown of the previous attempt → `NotAttempted`, no login
//! 3. Otherwise the attempt is recorded first, then `Relogin` produces a fresh
//!    snapshot
//! 4. Same fingerprint as before → `NoChange` (the loop-breaker; callers turn
//!    it into `ReauthSuppressed` with `ensure_recoverable`)
//! 5. New fingerprint → snapshot replaced, artifact persisted, `Refreshed`

pub mod error;
pub mod manager;

pub use error::{Error, Result};
pub use manager::{LifecycleManager, RefreshOutcome, Relogin};
