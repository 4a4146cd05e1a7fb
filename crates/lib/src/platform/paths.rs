//! Default locations for opkg state.
//!
//! The opkg directory holds everything opkg owns on a host:
//!
//! ```text
//! <opkg_dir>/
//!   conf/opkg.toml      # optional configuration file
//!   pkgs/<name>/        # downloaded archives and per-deployment staging trees
//!   meta/<name>/        # install ledger (Latest.meta, Previous.meta)
//!   history/<file>      # append-only deployment history log
//! ```
//!
//! Deployed trees live under `<install_root>/installs/<deploy_stamp>/<name>`.

use crate::consts::APP_NAME;
use std::path::{Path, PathBuf};

/// Environment variable overriding the opkg directory.
pub const OPKG_DIR_ENV: &str = "OPKG_DIR";
/// Environment variable overriding the configuration file location.
pub const OPKG_CONF_ENV: &str = "OPKG_CONF";
/// Environment variable overriding the install root.
pub const OPKG_INSTALL_ROOT_ENV: &str = "OPKG_INSTALL_ROOT";

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var_os("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("C:\\"))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var_os("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|| home_dir().join("AppData").join("Roaming"))
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the opkg directory: `$OPKG_DIR` if set, otherwise the data directory.
pub fn opkg_dir() -> PathBuf {
  std::env::var_os(OPKG_DIR_ENV)
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
    .unwrap_or_else(data_dir)
}

/// Returns the configuration file for an opkg directory: `$OPKG_CONF` if set,
/// otherwise `<opkg_dir>/conf/opkg.toml`.
pub fn conf_file(opkg_dir: &Path) -> PathBuf {
  std::env::var_os(OPKG_CONF_ENV)
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
    .unwrap_or_else(|| opkg_dir.join("conf").join(format!("{APP_NAME}.toml")))
}

/// Directory holding downloaded archives and deployment staging trees for a package.
pub fn package_dir(opkg_dir: &Path, package: &str) -> PathBuf {
  opkg_dir.join("pkgs").join(package)
}

/// Root of the install ledger.
pub fn meta_dir(opkg_dir: &Path) -> PathBuf {
  opkg_dir.join("meta")
}

pub fn history_dir(opkg_dir: &Path) -> PathBuf {
  opkg_dir.join("history")
}

/// Directory under which every deployment reserves its stamp directory.
pub fn installs_dir(install_root: &Path) -> PathBuf {
  install_root.join("installs")
}

/// Final location of a package deployed under `deploy_stamp`.
pub fn deploy_dir(install_root: &Path, deploy_stamp: u64, package: &str) -> PathBuf {
  installs_dir(install_root).join(deploy_stamp.to_string()).join(package)
}
