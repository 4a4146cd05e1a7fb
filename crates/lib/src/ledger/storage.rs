use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::types::{InstallHistory, InstallRecord, LedgerError};
use crate::platform::paths::meta_dir;
use crate::util::fs::write_atomic;
use crate::util::hash::{ContentHash, hash_file};

const LATEST_FILENAME: &str = "Latest.meta";
const PREVIOUS_FILENAME: &str = "Previous.meta";

/// Reads and writes install records on disk.
#[derive(Debug, Clone)]
pub struct Ledger {
  /// Base path of the ledger (`<opkg_dir>/meta`).
  base_path: PathBuf,
}

impl Ledger {
  /// Ledger stored under `<opkg_dir>/meta`.
  pub fn new(opkg_dir: &Path) -> Self {
    Self {
      base_path: meta_dir(opkg_dir),
    }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  /// Directory holding the records (and lock) of `package`.
  pub fn package_dir(&self, package: &str) -> PathBuf {
    self.base_path.join(package)
  }

  fn latest_path(&self, package: &str) -> PathBuf {
    self.package_dir(package).join(LATEST_FILENAME)
  }

  fn previous_path(&self, package: &str) -> PathBuf {
    self.package_dir(package).join(PREVIOUS_FILENAME)
  }

  /// Load both records of `package`.
  ///
  /// Missing or malformed records are reported in the log and read as `None`.
  pub fn load(&self, package: &str) -> InstallHistory {
    InstallHistory {
      latest: read_record(&self.latest_path(package)),
      previous: read_record(&self.previous_path(package)),
    }
  }

  pub fn latest(&self, package: &str) -> Option<InstallRecord> {
    read_record(&self.latest_path(package))
  }

  /// Make `record` the latest installation of its package.
  ///
  /// The current latest record becomes the previous one. If that rotation fails,
  /// nothing is overwritten.
  pub fn record(&self, record: &InstallRecord) -> Result<(), LedgerError> {
    for (field, value) in record.text_fields() {
      if value.contains([',', '\n', '\r']) {
        return Err(LedgerError::InvalidField {
          field,
          value: value.to_string(),
        });
      }
    }

    let package = &record.package_name;
    let dir = self.package_dir(package);
    fs::create_dir_all(&dir).map_err(|e| LedgerError::CreateDir {
      path: dir.clone(),
      source: e,
    })?;

    let latest = self.latest_path(package);
    let previous = self.previous_path(package);
    match fs::rename(&latest, &previous) {
      Ok(()) => debug!(package = %package, "rotated latest install record"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => {
        return Err(LedgerError::Rotate {
          from: latest,
          to: previous,
          source: e,
        });
      }
    }

    let line = format!("{}\n", record.to_line());
    write_atomic(&latest, line.as_bytes()).map_err(|e| LedgerError::Write {
      path: latest.clone(),
      source: e,
    })?;

    info!(package = %package, release = %record.release_id, stamp = record.deploy_stamp, "recorded installation");
    Ok(())
  }

  /// Whether `archive` is the latest installation of `package`.
  pub fn is_installed(&self, package: &str, archive: &Path) -> Result<bool, LedgerError> {
    let hash = hash_file(archive)?;
    Ok(self.is_latest(package, &hash))
  }

  /// Whether `hash` matches the latest installation of `package`.
  pub fn is_latest(&self, package: &str, hash: &ContentHash) -> bool {
    self
      .latest(package)
      .is_some_and(|latest| latest.content_hash == *hash)
  }

  /// Names of all packages with a ledger directory, sorted.
  pub fn installed_packages(&self) -> Result<Vec<String>, LedgerError> {
    let entries = match fs::read_dir(&self.base_path) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => {
        return Err(LedgerError::List {
          path: self.base_path.clone(),
          source: e,
        });
      }
    };

    let mut names = Vec::new();
    for entry in entries {
      let entry = entry.map_err(|e| LedgerError::List {
        path: self.base_path.clone(),
        source: e,
      })?;
      if entry.file_type().is_ok_and(|t| t.is_dir())
        && let Some(name) = entry.file_name().to_str()
      {
        names.push(name.to_string());
      }
    }
    names.sort();
    Ok(names)
  }
}

fn read_record(path: &Path) -> Option<InstallRecord> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {
      debug!(path = ?path, "no install record");
      return None;
    }
    Err(e) => {
      warn!(path = ?path, error = %e, "failed to read install record");
      return None;
    }
  };

  match content.parse::<InstallRecord>() {
    Ok(record) => Some(record),
    Err(e) => {
      warn!(path = ?path, error = %e, "ignoring malformed install record");
      None
    }
  }
}
