//! Platform-specific locations and filesystem operations.

pub mod paths;
pub mod perms;
