use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::util::hash::{ContentHash, HashError};

/// One successful installation of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallRecord {
  pub package_name: String,
  /// Release label, `dev` for development archives.
  pub release_id: String,
  /// Release timestamp from the archive name, `0` when absent.
  pub release_timestamp: String,
  /// SHA-256 of the installed archive.
  pub content_hash: ContentHash,
  /// Deployment stamp naming `<install_root>/installs/<deploy_stamp>`.
  pub deploy_stamp: u64,
}

/// The latest and previous installations of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallHistory {
  pub latest: Option<InstallRecord>,
  pub previous: Option<InstallRecord>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed install record: {0:?}")]
pub struct MalformedRecord(pub String);

impl InstallRecord {
  /// Serialize as a single comma-separated line (without newline).
  pub fn to_line(&self) -> String {
    format!(
      "{},{},{},{},{}",
      self.package_name, self.release_id, self.release_timestamp, self.content_hash, self.deploy_stamp
    )
  }

  /// The text fields that must not contain the record separator.
  pub(crate) fn text_fields(&self) -> [(&'static str, &str); 3] {
    [
      ("package_name", self.package_name.as_str()),
      ("release_id", self.release_id.as_str()),
      ("release_timestamp", self.release_timestamp.as_str()),
    ]
  }
}

impl fmt::Display for InstallRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_line())
  }
}

impl FromStr for InstallRecord {
  type Err = MalformedRecord;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let line = s.lines().next().unwrap_or_default().trim();
    let malformed = || MalformedRecord(line.to_string());

    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 5 {
      return Err(malformed());
    }

    let deploy_stamp = fields[4].trim().parse::<u64>().map_err(|_| malformed())?;
    if fields[0].is_empty() || fields[3].is_empty() {
      return Err(malformed());
    }

    Ok(InstallRecord {
      package_name: fields[0].to_string(),
      release_id: fields[1].to_string(),
      release_timestamp: fields[2].to_string(),
      content_hash: ContentHash(fields[3].to_string()),
      deploy_stamp,
    })
  }
}

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("failed to create ledger directory {}: {source}", path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to rotate {} to {}: {source}", from.display(), to.display())]
  Rotate {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to list ledger {}: {source}", path.display())]
  List {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("install record field {field} contains a separator: {value:?}")]
  InvalidField { field: &'static str, value: String },

  #[error(transparent)]
  Hash(#[from] HashError),
}
