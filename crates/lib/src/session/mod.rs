//! Deployment sessions.
//!
//! A session is one invocation of a deployment. It reserves a unique deploy
//! stamp under the install root, owns the template variables shared by its
//! packages, and installs each package in turn:
//!
//! 1. [`DeploySession::stage_archive`] copies a local archive into the opkg directory
//! 2. [`DeploySession::install_package`] checks the ledger, takes the package lock
//!    and runs the deployment engine
//! 3. [`DeploySession::finish`] releases the stamp directory if nothing used it

mod history;

pub use history::HistoryLog;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{VAR_ACTION, VAR_DEPLOY_DIR, VAR_PACKAGE_NAME, VAR_RELEASE_ID, VAR_RELEASE_TIMESTAMP};
use crate::deploy::{DeployContext, DeployError, Engine};
use crate::ledger::{Ledger, LedgerError};
use crate::lock::{LockError, PackageLock};
use crate::package::{Package, PackageError, parse_archive_name, parse_label, validate_name};
use crate::platform::paths;
use crate::util::hash::{HashError, hash_file};
use crate::util::unix_millis;

/// Attempts at reserving a stamp directory before giving up.
const MAX_STAMP_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum SessionError {
  #[error("failed to prepare {}: {source}", path.display())]
  Setup {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("no free deploy stamp under {}", path.display())]
  StampExhausted { path: PathBuf },

  #[error("failed to write history log {}: {source}", path.display())]
  History {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Package(#[from] PackageError),

  #[error("only local .tgz archives can be deployed: {0}")]
  NotLocal(String),

  #[error("failed to stage {} into {}: {source}", from.display(), to.display())]
  Stage {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error(transparent)]
  Ledger(#[from] LedgerError),

  #[error("deployment of {package} failed in {}: {source}", source.phase())]
  Deploy {
    package: String,
    #[source]
    source: DeployError,
  },
}

/// Settings for a deployment session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
  pub opkg_dir: PathBuf,
  pub install_root: PathBuf,
  /// The deployment history log, usually `<opkg_dir>/history/deploy_history.log`.
  pub history_path: PathBuf,
  /// Extra template variables; they never override the session's own.
  pub extra_vars: BTreeMap<String, String>,
  /// Reinstall even if the archive is already the latest installation.
  pub force: bool,
  /// Shell used for hooks instead of the platform default.
  pub shell: Option<String>,
  /// Keep `<file>.<unix_secs>` copies of files rewritten by templates and replaces.
  pub backup: bool,
}

/// The result of installing one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallOutcome {
  Installed { deploy_dir: PathBuf },
  AlreadyInstalled { location: PathBuf },
}

pub struct DeploySession {
  opkg_dir: PathBuf,
  install_root: PathBuf,
  deploy_stamp: u64,
  variables: BTreeMap<String, String>,
  history: HistoryLog,
  ledger: Ledger,
  force: bool,
  shell: Option<String>,
  backup: bool,
  installed: usize,
}

impl DeploySession {
  /// Prepare the opkg directory and reserve a deploy stamp.
  pub fn new(options: SessionOptions) -> Result<Self, SessionError> {
    for dir in [options.opkg_dir.join("pkgs"), paths::installs_dir(&options.install_root)] {
      fs::create_dir_all(&dir).map_err(|e| SessionError::Setup { path: dir.clone(), source: e })?;
    }

    let deploy_stamp = reserve_stamp(&paths::installs_dir(&options.install_root))?;

    let mut variables = options.extra_vars;
    variables.insert(VAR_ACTION.to_string(), "deploy".to_string());
    for name in [VAR_PACKAGE_NAME, VAR_RELEASE_ID, VAR_RELEASE_TIMESTAMP, VAR_DEPLOY_DIR] {
      variables.insert(name.to_string(), String::new());
    }

    let history = HistoryLog::new(options.history_path, deploy_stamp);

    info!(stamp = deploy_stamp, install_root = ?options.install_root, "deployment session started");

    Ok(Self {
      ledger: Ledger::new(&options.opkg_dir),
      opkg_dir: options.opkg_dir,
      install_root: options.install_root,
      deploy_stamp,
      variables,
      history,
      force: options.force,
      shell: options.shell,
      backup: options.backup,
      installed: 0,
    })
  }

  pub fn deploy_stamp(&self) -> u64 {
    self.deploy_stamp
  }

  pub fn variables(&self) -> &BTreeMap<String, String> {
    &self.variables
  }

  pub fn ledger(&self) -> &Ledger {
    &self.ledger
  }

  /// `<install_root>/installs/<deploy_stamp>`.
  pub fn version_dir(&self) -> PathBuf {
    paths::installs_dir(&self.install_root).join(self.deploy_stamp.to_string())
  }

  /// Copy the local archive named by `label` into the package's download directory.
  ///
  /// Returns the package name and the archive file name.
  pub fn stage_archive(&self, label: &Path) -> Result<(String, String), SessionError> {
    let text = label.to_string_lossy();
    let parsed = parse_label(&text)?;
    if !parsed.is_local {
      return Err(SessionError::NotLocal(text.into_owned()));
    }

    let dir = paths::package_dir(&self.opkg_dir, &parsed.name);
    fs::create_dir_all(&dir).map_err(|e| SessionError::Setup { path: dir.clone(), source: e })?;

    let dest = dir.join(&parsed.archive_name);
    let same_file = matches!(
      (dunce::canonicalize(label), dunce::canonicalize(&dest)),
      (Ok(a), Ok(b)) if a == b
    );
    if !same_file {
      fs::copy(label, &dest).map_err(|e| SessionError::Stage {
        from: label.to_path_buf(),
        to: dest.clone(),
        source: e,
      })?;
    }

    debug!(package = %parsed.name, archive = ?dest, "staged archive");
    Ok((parsed.name, parsed.archive_name))
  }

  /// Install a staged archive, unless it is already the latest installation.
  pub fn install_package(&mut self, name: &str, archive_file_name: &str) -> Result<InstallOutcome, SessionError> {
    validate_name(name)?;
    let release = parse_archive_name(archive_file_name);
    let archive = paths::package_dir(&self.opkg_dir, name).join(archive_file_name);
    let deploy_dir = paths::deploy_dir(&self.install_root, self.deploy_stamp, name);

    self.variables.insert(VAR_PACKAGE_NAME.to_string(), name.to_string());
    self.variables.insert(VAR_RELEASE_ID.to_string(), release.label().to_string());
    self.variables.insert(
      VAR_RELEASE_TIMESTAMP.to_string(),
      release.release_timestamp.clone().unwrap_or_default(),
    );
    self
      .variables
      .insert(VAR_DEPLOY_DIR.to_string(), deploy_dir.display().to_string());

    self.log(&format!("Installing package {name} using {}", archive.display()))?;

    let _lock = PackageLock::acquire(&self.ledger.package_dir(name), &format!("opkg deploy {name}"))?;

    let content_hash = hash_file(&archive)?;
    if !self.force
      && self.ledger.is_latest(name, &content_hash)
      && let Some(latest) = self.ledger.latest(name)
    {
      let location = paths::deploy_dir(&self.install_root, latest.deploy_stamp, name);
      info!(package = %name, location = ?location, "package already installed");
      self.log(&format!("Package {name} already installed at {}", location.display()))?;
      return Ok(InstallOutcome::AlreadyInstalled { location });
    }

    let package = Package {
      name: name.to_string(),
      release,
      archive,
      content_hash,
    };
    let engine = Engine::new(DeployContext {
      staging_dir: paths::package_dir(&self.opkg_dir, name).join(self.deploy_stamp.to_string()),
      deploy_dir,
      deploy_stamp: self.deploy_stamp,
      variables: &self.variables,
      ledger: &self.ledger,
      shell: self.shell.as_deref(),
      backup: self.backup,
    });

    let result = engine.install(&package);
    let deploy_dir = match result {
      Ok(deploy_dir) => deploy_dir,
      Err(source) => {
        self.log(&format!("Failed to install {name}: {source}"))?;
        return Err(SessionError::Deploy {
          package: name.to_string(),
          source,
        });
      }
    };

    self.installed += 1;
    self.log(&format!(
      "Installed {name} ({}) at {}",
      package.release.label(),
      deploy_dir.display()
    ))?;
    Ok(InstallOutcome::Installed { deploy_dir })
  }

  /// Release the reserved stamp directory if no package was installed into it.
  pub fn finish(&self) {
    let version_dir = self.version_dir();
    if self.installed == 0 {
      // Only succeeds while empty; a failed deployment's leftovers stay for inspection.
      match fs::remove_dir(&version_dir) {
        Ok(()) => debug!(path = ?version_dir, "released unused deploy stamp"),
        Err(e) => debug!(path = ?version_dir, error = %e, "kept deploy stamp directory"),
      }
    }
    info!(stamp = self.deploy_stamp, installed = self.installed, "deployment session finished");
  }

  fn log(&self, message: &str) -> Result<(), SessionError> {
    self.history.append(message).map_err(|e| SessionError::History {
      path: self.history.path().to_path_buf(),
      source: e,
    })
  }
}

/// Reserve `<installs_dir>/<millis>`, bumping the stamp until the directory is new.
fn reserve_stamp(installs_dir: &Path) -> Result<u64, SessionError> {
  let mut stamp = unix_millis();
  for _ in 0..MAX_STAMP_ATTEMPTS {
    let dir = installs_dir.join(stamp.to_string());
    match fs::create_dir(&dir) {
      Ok(()) => return Ok(stamp),
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => stamp += 1,
      Err(e) => return Err(SessionError::Setup { path: dir, source: e }),
    }
  }
  Err(SessionError::StampExhausted {
    path: installs_dir.to_path_buf(),
  })
}
