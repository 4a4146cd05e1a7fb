//! Layered opkg configuration.
//!
//! Settings are resolved from lowest to highest precedence:
//! built-in defaults, the TOML configuration file, environment variables
//! (`OPKG_DIR`, `OPKG_INSTALL_ROOT`), then explicit overrides from the command line.
//!
//! ```toml
//! [basic]
//! opkg_dir = "/var/lib/opkg"
//! install_root = "/opt/app"
//! deploy_history_file = "deploy_history.log"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::consts::DEFAULT_HISTORY_FILE;
use crate::platform::paths::{self, OPKG_DIR_ENV, OPKG_INSTALL_ROOT_ENV};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("configuration file not found: {}", path.display())]
  NotFound { path: PathBuf },

  #[error("failed to read configuration file {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse configuration file {}: {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("no install root configured (use --install-root, $OPKG_INSTALL_ROOT or [basic].install_root)")]
  MissingInstallRoot,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
  #[serde(default)]
  basic: BasicSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BasicSection {
  opkg_dir: Option<PathBuf>,
  install_root: Option<PathBuf>,
  deploy_history_file: Option<String>,
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
  pub opkg_dir: Option<PathBuf>,
  pub conf_file: Option<PathBuf>,
  pub install_root: Option<PathBuf>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub opkg_dir: PathBuf,
  pub install_root: Option<PathBuf>,
  pub deploy_history_file: String,
}

impl Config {
  /// Resolve configuration from defaults, the configuration file, the environment and `overrides`.
  ///
  /// A configuration file named explicitly (through `overrides.conf_file`) must exist;
  /// the default location is optional.
  pub fn load(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
    let env_opkg_dir = env_path(OPKG_DIR_ENV);
    let bootstrap_dir = overrides.opkg_dir.clone().unwrap_or_else(paths::opkg_dir);

    let (conf_path, required) = match &overrides.conf_file {
      Some(path) => (path.clone(), true),
      None => (paths::conf_file(&bootstrap_dir), false),
    };
    let file = read_config_file(&conf_path, required)?;
    if file.is_some() {
      debug!(path = ?conf_path, "read configuration file");
    }
    let basic = file.map(|f| f.basic).unwrap_or_default();

    let opkg_dir = overrides
      .opkg_dir
      .clone()
      .or(env_opkg_dir)
      .or(basic.opkg_dir)
      .unwrap_or(bootstrap_dir);

    let install_root = overrides
      .install_root
      .clone()
      .or_else(|| env_path(OPKG_INSTALL_ROOT_ENV))
      .or(basic.install_root);

    let deploy_history_file = basic
      .deploy_history_file
      .filter(|f| !f.is_empty())
      .unwrap_or_else(|| DEFAULT_HISTORY_FILE.to_string());

    let config = Config {
      opkg_dir,
      install_root,
      deploy_history_file,
    };
    debug!(?config, "resolved configuration");
    Ok(config)
  }

  /// The install root, required by deployments.
  pub fn install_root(&self) -> Result<&Path, ConfigError> {
    self.install_root.as_deref().ok_or(ConfigError::MissingInstallRoot)
  }

  /// Path of the deployment history log.
  pub fn history_path(&self) -> PathBuf {
    paths::history_dir(&self.opkg_dir).join(&self.deploy_history_file)
  }
}

fn env_path(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

fn read_config_file(path: &Path, required: bool) -> Result<Option<ConfigFile>, ConfigError> {
  if !path.exists() {
    if required {
      return Err(ConfigError::NotFound { path: path.to_path_buf() });
    }
    debug!(path = ?path, "no configuration file, using defaults");
    return Ok(None);
  }

  let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
    path: path.to_path_buf(),
    source: e,
  })?;
  let file = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
    path: path.to_path_buf(),
    source: e,
  })?;
  Ok(Some(file))
}
