//! Shared utilities.
//!
//! Common utilities used across the crate including hashing, tree copies and test helpers.

pub mod fs;
pub mod hash;


/// Seconds since the Unix epoch, or 0 if the clock is before it.
pub fn unix_secs() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn unix_millis() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_millis() as u64)
    .unwrap_or(0)
}
