//! Package identity: names, deploy labels and archive file names.
//!
//! Archive file names encode the release:
//!
//! | file                  | release id | release timestamp |
//! |-----------------------|------------|-------------------|
//! | `web.tgz`             | (dev)      | -                 |
//! | `web-1.4.tgz`         | `1.4`      | -                 |
//! | `web-1.4-20240101.tgz`| `1.4`      | `20240101`        |

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::consts::{ARCHIVE_EXT, DEV_RELEASE};
use crate::util::hash::ContentHash;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PackageError {
  #[error("illegal character in package name '{0}' (allowed: letters, digits, '_')")]
  IllegalName(String),

  #[error("invalid package label '{0}'")]
  InvalidLabel(String),
}

/// Check that `name` matches `[A-Za-z0-9_]+`.
pub fn validate_name(name: &str) -> Result<(), PackageError> {
  if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
    Ok(())
  } else {
    Err(PackageError::IllegalName(name.to_string()))
  }
}

/// A package reference as given on the command line, e.g. `./dist/web-1.4.tgz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageLabel {
  pub name: String,
  /// Base name with extension, e.g. `web-1.4.tgz`.
  pub archive_name: String,
  /// Whether the label names a local archive file.
  pub is_local: bool,
}

/// Parse a package label into its name and archive file name.
pub fn parse_label(label: &str) -> Result<PackageLabel, PackageError> {
  let base = Path::new(label)
    .file_name()
    .and_then(|n| n.to_str())
    .ok_or_else(|| PackageError::InvalidLabel(label.to_string()))?;

  let suffix = format!(".{ARCHIVE_EXT}");
  let (name_release, is_local) = match base.strip_suffix(&suffix) {
    Some(stem) => (stem, true),
    None => (base, false),
  };
  let name = name_release.split('-').next().unwrap_or_default();
  validate_name(name)?;

  Ok(PackageLabel {
    name: name.to_string(),
    archive_name: format!("{name_release}{suffix}"),
    is_local,
  })
}

/// Release information carried by an archive file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
  pub release_id: Option<String>,
  pub release_timestamp: Option<String>,
}

impl ReleaseInfo {
  pub fn is_release(&self) -> bool {
    self.release_id.is_some()
  }

  /// The release id, or `dev` for development archives.
  pub fn label(&self) -> &str {
    self.release_id.as_deref().unwrap_or(DEV_RELEASE)
  }

  /// The release timestamp, or `0` when the archive carries none.
  pub fn timestamp(&self) -> &str {
    self.release_timestamp.as_deref().unwrap_or("0")
  }
}

/// Derive release information from an archive file name.
pub fn parse_archive_name(file_name: &str) -> ReleaseInfo {
  let base = Path::new(file_name)
    .file_name()
    .and_then(|n| n.to_str())
    .unwrap_or(file_name);
  let stem = base.strip_suffix(&format!(".{ARCHIVE_EXT}")).unwrap_or(base);

  let mut parts = stem.splitn(3, '-').skip(1);
  let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
  let release_id = non_empty(parts.next());
  let release_timestamp = release_id.as_ref().and_then(|_| non_empty(parts.next()));

  ReleaseInfo {
    release_id,
    release_timestamp,
  }
}

/// Archive file name for a package: `<name>.tgz` or `<name>-<release>.tgz`.
pub fn archive_file_name(name: &str, release_id: Option<&str>) -> String {
  match release_id {
    Some(release) => format!("{name}-{release}.{ARCHIVE_EXT}"),
    None => format!("{name}.{ARCHIVE_EXT}"),
  }
}

/// A package archive being installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  pub name: String,
  pub release: ReleaseInfo,
  /// Downloaded archive under the opkg directory.
  pub archive: PathBuf,
  pub content_hash: ContentHash,
}
