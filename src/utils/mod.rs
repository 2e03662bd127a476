//! Utility functions and helpers.
//!
//! Common utilities for environment variable handling and timestamps.

pub mod env;

pub use env::get_env_with_prefix;

/// Current time as seconds since the Unix epoch.
#[must_use]
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Epoch day for a timestamp (used as the usage-counter bucket).
#[must_use]
pub fn epoch_day(timestamp: u64) -> u64 {
    timestamp / 86_400
}
