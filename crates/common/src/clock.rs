//! Wall-clock helpers
//!
//! Artifacts (`capturedAt`, `discoveredAt`) and captured calls are stamped in
//! unix milliseconds. Elapsed-time decisions (cooldowns, settle waits) use
//! monotonic `Instant`s instead and never go through here.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    epoch_millis(SystemTime::now())
}

/// Convert a `SystemTime` to unix milliseconds, clamping pre-epoch values to 0.
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
