use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::hooks::HookError;
use crate::archive::ArchiveError;
use crate::ledger::{Ledger, LedgerError};
use crate::manifest::ManifestError;
use crate::platform::perms::PermissionError;
use crate::template::TemplateError;

/// The ordered phases of a package installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Extract,
  ResolveManifest,
  PreDeploy,
  Targets,
  Templates,
  Replaces,
  Symlinks,
  Permissions,
  PostDeploy,
  Ledger,
  Cleanup,
}

impl Phase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Phase::Extract => "extract",
      Phase::ResolveManifest => "resolve_manifest",
      Phase::PreDeploy => "pre_deploy",
      Phase::Targets => "targets",
      Phase::Templates => "templates",
      Phase::Replaces => "replaces",
      Phase::Symlinks => "symlinks",
      Phase::Permissions => "permissions",
      Phase::PostDeploy => "post_deploy",
      Phase::Ledger => "ledger",
      Phase::Cleanup => "cleanup",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Everything a single installation needs from its session.
#[derive(Debug, Clone)]
pub struct DeployContext<'a> {
  /// Where the archive is extracted (`<opkg_dir>/pkgs/<name>/<deploy_stamp>`).
  pub staging_dir: PathBuf,
  /// Final location (`<install_root>/installs/<deploy_stamp>/<name>`).
  pub deploy_dir: PathBuf,
  pub deploy_stamp: u64,
  /// Template variables, also exported to hooks.
  pub variables: &'a BTreeMap<String, String>,
  pub ledger: &'a Ledger,
  pub shell: Option<&'a str>,
  /// Keep backups of files rewritten by the templates and replaces phases.
  pub backup: bool,
}

#[derive(Debug, Error)]
pub enum DeployError {
  #[error("failed to extract archive: {0}")]
  Extract(#[source] ArchiveError),

  #[error("failed to prepare {}: {source}", path.display())]
  Prepare {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid embedded manifest: {0}")]
  Manifest(#[from] ManifestError),

  #[error("{phase} hook failed: {source}")]
  Hook {
    phase: Phase,
    #[source]
    source: HookError,
  },

  #[error("failed to copy target {} to {}: {source}", from.display(), to.display())]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{phase} failed for {}: {source}", path.display())]
  Template {
    phase: Phase,
    path: PathBuf,
    #[source]
    source: TemplateError,
  },

  #[error("failed to link {} -> {}: {source}", link.display(), target.display())]
  Symlink {
    link: PathBuf,
    target: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to set permissions on {}: {source}", path.display())]
  Permission {
    path: PathBuf,
    #[source]
    source: PermissionError,
  },

  #[error("failed to update install ledger: {0}")]
  Ledger(#[from] LedgerError),
}

impl DeployError {
  /// The phase that failed.
  pub fn phase(&self) -> Phase {
    match self {
      DeployError::Extract(_) => Phase::Extract,
      DeployError::Prepare { .. } | DeployError::Manifest(_) => Phase::ResolveManifest,
      DeployError::Hook { phase, .. } | DeployError::Template { phase, .. } => *phase,
      DeployError::Copy { .. } => Phase::Targets,
      DeployError::Symlink { .. } => Phase::Symlinks,
      DeployError::Permission { .. } => Phase::Permissions,
      DeployError::Ledger(_) => Phase::Ledger,
    }
  }
}
