//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory with isolated build root, output,
/// opkg and install directories.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  fn dir(&self, name: &str) -> PathBuf {
    let p = self.temp.path().join(name);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Manifests and package sources.
  pub fn build_root(&self) -> PathBuf {
    self.dir("build")
  }

  /// Working directory of every command; `create` writes archives here.
  pub fn work_dir(&self) -> PathBuf {
    self.dir("work")
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
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Get a pre-configured Command for the opkg binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `OPKG_DIR`: Isolated opkg directory
  /// - `OPKG_INSTALL_ROOT`: Isolated install root
  ///
  /// `OPKG_CONF` is removed so no user configuration is read.
  pub fn opkg_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("opkg");
    cmd.env("OPKG_DIR", self.opkg_dir());
    cmd.env("OPKG_INSTALL_ROOT", self.install_root());
    cmd.env_remove("OPKG_CONF");
    cmd.current_dir(self.work_dir());
    cmd
  }

  /// Run `opkg create` for one package and return the archive path.
  pub fn create(&self, name: &str, release: Option<&str>) -> PathBuf {
    let mut cmd = self.opkg_cmd();
    cmd.args(["create", "--pkg", name, "--build-root"]).arg(self.build_root());
    if release.is_some() {
      cmd.arg("--release");
    }
    cmd.assert().success();

    let file = match release {
      Some(rel) => format!("{}-{}.tgz", name, rel),
      None => format!("{}.tgz", name),
    };
    self.work_dir().join(file)
  }

  /// Directories under `<install_root>/installs`.
  pub fn stamps(&self) -> Vec<PathBuf> {
    let installs = self.install_root().join("installs");
    if !installs.exists() {
      return Vec::new();
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(installs)
      .unwrap()
      .map(|e| e.unwrap().path())
      .collect();
    dirs.sort();
    dirs
  }

  pub fn history(&self) -> String {
    std::fs::read_to_string(self.opkg_dir().join("history/deploy_history.log")).unwrap_or_default()
  }
}
