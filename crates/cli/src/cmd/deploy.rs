//! Implementation of the `opkg deploy` command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::debug;

use opkg_lib::config::{Config, ConfigOverrides};
use opkg_lib::session::{DeploySession, InstallOutcome, SessionError, SessionOptions};

use crate::output::{Status, elapsed, stat, status};

/// Execute the deploy command.
///
/// All archives share one deployment session, and therefore one deploy stamp:
/// - Each archive is copied into the opkg directory and installed in order
/// - A package whose archive is already the latest installation is skipped unless `force` is set
/// - With `backup`, files rewritten by templates and replaces keep a `<file>.<unix_secs>` copy
/// - A failed package is reported and the remaining packages are still attempted
///
/// Exits with an error if any package failed.
pub fn cmd_deploy(
  overrides: &ConfigOverrides,
  archives: &[PathBuf],
  force: bool,
  backup: bool,
  extra_vars: BTreeMap<String, String>,
) -> Result<()> {
  let start = Instant::now();
  let config = Config::load(overrides).context("Failed to load configuration")?;
  let install_root = config.install_root()?.to_path_buf();

  let mut session = DeploySession::new(SessionOptions {
    opkg_dir: config.opkg_dir.clone(),
    install_root,
    history_path: config.history_path(),
    extra_vars,
    force,
    shell: None,
    backup,
  })
  .context("Failed to start deployment session")?;

  let mut installed = 0;
  let mut unchanged = 0;
  let mut failed = 0;
  for archive in archives {
    match deploy_one(&mut session, archive) {
      Ok((name, InstallOutcome::Installed { deploy_dir })) => {
        installed += 1;
        status(Status::Done, &format!("Installed {} at {}", name, deploy_dir.display()));
      }
      Ok((name, InstallOutcome::AlreadyInstalled { location })) => {
        unchanged += 1;
        status(Status::Note, &format!("Package {} already installed at {}", name, location.display()));
      }
      Err(e) => {
        failed += 1;
        status(Status::Failed, &format!("{}: {}", archive.display(), e));
      }
    }
  }

  session.finish();
  debug!(stamp = session.deploy_stamp(), installed, unchanged, failed, "deploy finished");

  println!();
  stat("Deploy stamp", session.deploy_stamp());
  stat("Installed", installed);
  stat("Unchanged", unchanged);
  stat("Failed", failed);
  stat("Duration", elapsed(start.elapsed()));

  if failed > 0 {
    bail!("{} of {} package(s) failed to deploy", failed, archives.len());
  }
  Ok(())
}

fn deploy_one(session: &mut DeploySession, archive: &Path) -> Result<(String, InstallOutcome), SessionError> {
  let (name, file) = session.stage_archive(archive)?;
  let outcome = session.install_package(&name, &file)?;
  Ok((name, outcome))
}
