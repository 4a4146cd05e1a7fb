//! Recursive ownership and mode changes for deployed trees.
//!
//! `apply_ownership` is the equivalent of `chown -R owner:group` followed by
//! `chmod -R mode`: every entry under the path (the path itself included) gets
//! the owner, group and mode. Symlinks are re-owned but never followed, and their
//! mode is left alone.
//!
//! Owners and groups may be given as names or numeric ids.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// Error during ownership or mode changes.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
  #[error("path does not exist: {}", path.display())]
  NotFound { path: PathBuf },

  #[error("unknown user '{0}'")]
  UnknownUser(String),

  #[error("unknown group '{0}'")]
  UnknownGroup(String),

  #[error("failed to look up '{name}': {message}")]
  Lookup { name: String, message: String },

  #[error("failed to change owner of {}: {source}", path.display())]
  Chown {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to set mode {mode:o} on {}: {source}", path.display())]
  Chmod {
    path: PathBuf,
    mode: u32,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to traverse directory {}: {source}", path.display())]
  WalkDir {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("ownership changes are not supported on this platform")]
  Unsupported,
}

/// Recursively set owner, group and mode on `path`.
pub fn apply_ownership(path: &Path, owner: &str, group: &str, mode: u32) -> Result<usize, PermissionError> {
  if std::fs::symlink_metadata(path).is_err() {
    return Err(PermissionError::NotFound {
      path: path.to_path_buf(),
    });
  }

  let (uid, gid) = resolve_ids(owner, group)?;

  // Collect first: a restrictive mode on a directory must not stop the walk below it.
  let mut entries = Vec::new();
  for entry in WalkDir::new(path).follow_links(false) {
    let entry = entry.map_err(|e| PermissionError::WalkDir {
      path: path.to_path_buf(),
      source: e,
    })?;
    entries.push((entry.path().to_path_buf(), entry.path_is_symlink()));
  }

  for (entry, is_symlink) in &entries {
    set_owner(entry, uid, gid)?;
    if !is_symlink {
      set_mode(entry, mode)?;
    }
  }

  debug!(path = ?path, owner, group, mode = format!("{mode:o}"), entries = entries.len(), "applied ownership");
  Ok(entries.len())
}

// ============ Unix Implementation ============

#[cfg(unix)]
fn resolve_ids(owner: &str, group: &str) -> Result<(u32, u32), PermissionError> {
  use nix::unistd::{Group, User};

  let uid = match owner.parse::<u32>() {
    Ok(id) => id,
    Err(_) => User::from_name(owner)
      .map_err(|e| PermissionError::Lookup {
        name: owner.to_string(),
        message: e.to_string(),
      })?
      .ok_or_else(|| PermissionError::UnknownUser(owner.to_string()))?
      .uid
      .as_raw(),
  };

  let gid = match group.parse::<u32>() {
    Ok(id) => id,
    Err(_) => Group::from_name(group)
      .map_err(|e| PermissionError::Lookup {
        name: group.to_string(),
        message: e.to_string(),
      })?
      .ok_or_else(|| PermissionError::UnknownGroup(group.to_string()))?
      .gid
      .as_raw(),
  };

  Ok((uid, gid))
}

#[cfg(unix)]
fn set_owner(path: &Path, uid: u32, gid: u32) -> Result<(), PermissionError> {
  std::os::unix::fs::lchown(path, Some(uid), Some(gid)).map_err(|e| PermissionError::Chown {
    path: path.to_path_buf(),
    source: e,
  })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), PermissionError> {
  use std::os::unix::fs::PermissionsExt;

  std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| PermissionError::Chmod {
    path: path.to_path_buf(),
    mode,
    source: e,
  })
}

// ============ Windows Implementation ============

#[cfg(not(unix))]
fn resolve_ids(_owner: &str, _group: &str) -> Result<(u32, u32), PermissionError> {
  Err(PermissionError::Unsupported)
}

#[cfg(not(unix))]
fn set_owner(_path: &Path, _uid: u32, _gid: u32) -> Result<(), PermissionError> {
  Err(PermissionError::Unsupported)
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), PermissionError> {
  Err(PermissionError::Unsupported)
}
