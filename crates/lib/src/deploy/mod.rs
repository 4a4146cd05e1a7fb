//! The deployment engine.
//!
//! Installing a package runs these phases in order, stopping at the first failure:
//!
//! 1. extract the archive into the staging directory
//! 2. resolve variables in the embedded manifest and load it
//! 3. run `pre_deploy` hooks
//! 4. copy `targets` from the staging directory into the deploy directory
//! 5. resolve variables in `templates`
//! 6. apply `replaces`
//! 7. create `symlinks`
//! 8. apply `permissions`
//! 9. run `post_deploy` hooks
//! 10. record the installation in the ledger
//! 11. remove the staging directory
//!
//! Nothing is rolled back on failure: the staging and deploy directories are left
//! as they were for inspection, and the ledger is untouched.

pub mod hooks;
mod types;

pub use types::*;

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::archive;
use crate::consts::{MANIFEST_EXT, META_DIR};
use crate::ledger::InstallRecord;
use crate::manifest::{BuildKind, Manifest};
use crate::package::Package;
use crate::platform::perms::apply_ownership;
use crate::template::{replace_tokens, resolve_variables};
use crate::util::fs::{copy_path, replace_symlink, resolve_under};
use hooks::run_hook;

/// Installs packages into the locations given by a [`DeployContext`].
pub struct Engine<'a> {
  ctx: DeployContext<'a>,
}

impl<'a> Engine<'a> {
  pub fn new(ctx: DeployContext<'a>) -> Self {
    Self { ctx }
  }

  pub fn context(&self) -> &DeployContext<'a> {
    &self.ctx
  }

  /// Run every phase for `package` and return its deploy directory.
  pub fn install(&self, package: &Package) -> Result<PathBuf, DeployError> {
    let name = package.name.as_str();
    info!(package = %name, release = %package.release.label(), deploy_dir = ?self.ctx.deploy_dir, "installing package");

    self.phase(name, Phase::Extract, || self.extract(package))?;
    let manifest = self.phase(name, Phase::ResolveManifest, || self.resolve_manifest(package))?;
    self.phase(name, Phase::PreDeploy, || self.run_hooks(Phase::PreDeploy, manifest.pre_deploy()))?;
    self.phase(name, Phase::Targets, || self.copy_targets(&manifest))?;
    self.phase(name, Phase::Templates, || self.resolve_templates(&manifest))?;
    self.phase(name, Phase::Replaces, || self.apply_replaces(&manifest))?;
    self.phase(name, Phase::Symlinks, || self.create_symlinks(&manifest))?;
    self.phase(name, Phase::Permissions, || self.apply_permissions(&manifest))?;
    self.phase(name, Phase::PostDeploy, || self.run_hooks(Phase::PostDeploy, manifest.post_deploy()))?;
    self.phase(name, Phase::Ledger, || self.record(package))?;
    self.cleanup(name);

    info!(package = %name, deploy_dir = ?self.ctx.deploy_dir, "package installed");
    Ok(self.ctx.deploy_dir.clone())
  }

  fn phase<T>(&self, package: &str, phase: Phase, f: impl FnOnce() -> Result<T, DeployError>) -> Result<T, DeployError> {
    debug!(package, phase = %phase, "phase started");
    match f() {
      Ok(value) => {
        debug!(package, phase = %phase, "phase finished");
        Ok(value)
      }
      Err(e) => {
        warn!(package, phase = %phase, error = %e, "phase failed");
        Err(e)
      }
    }
  }

  fn extract(&self, package: &Package) -> Result<(), DeployError> {
    let entries = archive::unpack(&package.archive, &self.ctx.staging_dir).map_err(DeployError::Extract)?;
    debug!(archive = ?package.archive, staging = ?self.ctx.staging_dir, entries, "extracted archive");
    Ok(())
  }

  fn resolve_manifest(&self, package: &Package) -> Result<Manifest, DeployError> {
    fs::create_dir_all(&self.ctx.deploy_dir).map_err(|e| DeployError::Prepare {
      path: self.ctx.deploy_dir.clone(),
      source: e,
    })?;

    let manifest_path = self
      .ctx
      .staging_dir
      .join(META_DIR)
      .join(format!("{}.{MANIFEST_EXT}", package.name));
    resolve_variables(&manifest_path, self.ctx.variables, false).map_err(|e| DeployError::Template {
      phase: Phase::ResolveManifest,
      path: manifest_path.clone(),
      source: e,
    })?;

    let kind = if package.release.is_release() {
      BuildKind::Release
    } else {
      BuildKind::Dev
    };
    Ok(Manifest::load(&manifest_path, kind)?)
  }

  fn run_hooks(&self, phase: Phase, commands: &[String]) -> Result<(), DeployError> {
    for cmd in commands {
      run_hook(cmd, &self.ctx.staging_dir, self.ctx.variables, self.ctx.shell)
        .map_err(|e| DeployError::Hook { phase, source: e })?;
    }
    Ok(())
  }

  fn copy_targets(&self, manifest: &Manifest) -> Result<(), DeployError> {
    for pair in manifest.targets() {
      let source = resolve_under(&self.ctx.staging_dir, &pair.source);
      let target = resolve_under(&self.ctx.deploy_dir, &pair.target);
      let copied = copy_path(&source, &target).map_err(|e| DeployError::Copy {
        from: source.clone(),
        to: target.clone(),
        source: e,
      })?;
      debug!(source = ?source, target = ?target, copied, "copied target");
    }
    Ok(())
  }

  fn resolve_templates(&self, manifest: &Manifest) -> Result<(), DeployError> {
    for template in manifest.templates() {
      let path = self.deployed(template);
      resolve_variables(&path, self.ctx.variables, self.ctx.backup).map_err(|e| DeployError::Template {
        phase: Phase::Templates,
        path: path.clone(),
        source: e,
      })?;
    }
    Ok(())
  }

  fn apply_replaces(&self, manifest: &Manifest) -> Result<(), DeployError> {
    for entry in manifest.replaces() {
      let path = self.deployed(&entry.file);
      replace_tokens(&path, &entry.tokens, self.ctx.backup).map_err(|e| DeployError::Template {
        phase: Phase::Replaces,
        path: path.clone(),
        source: e,
      })?;
    }
    Ok(())
  }

  fn create_symlinks(&self, manifest: &Manifest) -> Result<(), DeployError> {
    for pair in manifest.symlinks() {
      let link = self.deployed(&pair.target);
      let target = self.deployed(&pair.source);
      replace_symlink(&target, &link).map_err(|e| DeployError::Symlink {
        link: link.clone(),
        target: target.clone(),
        source: e,
      })?;
      debug!(link = ?link, target = ?target, "created symlink");
    }
    Ok(())
  }

  fn apply_permissions(&self, manifest: &Manifest) -> Result<(), DeployError> {
    for entry in manifest.permissions() {
      let path = self.deployed(&entry.path);
      apply_ownership(&path, &entry.owner, &entry.group, entry.mode)
        .map_err(|e| DeployError::Permission { path: path.clone(), source: e })?;
    }
    Ok(())
  }

  fn record(&self, package: &Package) -> Result<(), DeployError> {
    let record = InstallRecord {
      package_name: package.name.clone(),
      release_id: package.release.label().to_string(),
      release_timestamp: package.release.timestamp().to_string(),
      content_hash: package.content_hash.clone(),
      deploy_stamp: self.ctx.deploy_stamp,
    };
    Ok(self.ctx.ledger.record(&record)?)
  }

  fn cleanup(&self, package: &str) {
    debug!(package, phase = %Phase::Cleanup, "phase started");
    match fs::remove_dir_all(&self.ctx.staging_dir) {
      Ok(()) => debug!(package, phase = %Phase::Cleanup, "phase finished"),
      Err(e) => warn!(package, staging = ?self.ctx.staging_dir, error = %e, "failed to remove staging directory"),
    }
  }

  /// A manifest path relative to the deploy directory, unless absolute.
  fn deployed(&self, path: &str) -> PathBuf {
    resolve_under(&self.ctx.deploy_dir, path)
  }
}
