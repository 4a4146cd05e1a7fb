//! Shared helpers for library end-to-end tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use opkg_lib::archive::{BuildRequest, build};
use opkg_lib::manifest::BuildKind;
use opkg_lib::session::{DeploySession, InstallOutcome, SessionError, SessionOptions};
use tempfile::TempDir;

/// Isolated workspace with a build root, an opkg directory and an install root.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn build_root(&self) -> PathBuf {
    self.dir("build")
  }

  pub fn dist(&self) -> PathBuf {
    self.dir("dist")
  }

  pub fn opkg_dir(&self) -> PathBuf {
    self.dir("opkg")
  }

  pub fn install_root(&self) -> PathBuf {
    self.dir("install")
  }

  /// Write a file relative to the build root.
  pub fn write_source(&self, relative_path: &str, content: &str) {
    let path = self.build_root().join(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }

  /// Build `<name>.yml` from the build root into `dist/`.
  pub fn build(&self, name: &str, kind: BuildKind) -> PathBuf {
    build(&BuildRequest {
      name: name.to_string(),
      build_root: self.build_root(),
      output_dir: self.dist(),
      kind,
    })
    .unwrap()
  }

  pub fn options(&self) -> SessionOptions {
    SessionOptions {
      opkg_dir: self.opkg_dir(),
      install_root: self.install_root(),
      history_path: self.history_path(),
      extra_vars: BTreeMap::new(),
      force: false,
      shell: None,
      backup: false,
    }
  }

  /// Deploy one archive in a fresh session.
  pub fn deploy(&self, archive: &Path, options: SessionOptions) -> Result<InstallOutcome, SessionError> {
    let mut session = DeploySession::new(options)?;
    let (name, file) = session.stage_archive(archive)?;
    let outcome = session.install_package(&name, &file);
    session.finish();
    outcome
  }

  pub fn history_path(&self) -> PathBuf {
    self.opkg_dir().join("history/deploy_history.log")
  }

  pub fn history(&self) -> String {
    fs::read_to_string(self.history_path()).unwrap_or_default()
  }
}

/// Names of the current user and group.
#[cfg(unix)]
pub fn current_owner() -> (String, String) {
  use nix::unistd::{Group, User, getgid, getuid};

  let user = User::from_uid(getuid()).unwrap().unwrap();
  let group = Group::from_gid(getgid()).unwrap().unwrap();
  (user.name, group.name)
}

pub fn deployed_dir(outcome: &InstallOutcome) -> PathBuf {
  match outcome {
    InstallOutcome::Installed { deploy_dir } => deploy_dir.clone(),
    other => panic!("expected a fresh install, got {other:?}"),
  }
}
