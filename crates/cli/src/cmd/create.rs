//! Implementation of the `opkg create` command.
//!
//! Builds one archive per requested package from `<build_root>/<name>.yml` and
//! writes it into the current directory.

use std::path::Path;

use anyhow::{Context, Result, bail};

use opkg_lib::archive::{self, BuildRequest};
use opkg_lib::manifest::BuildKind;

use crate::output::{Status, status};

/// Execute the create command.
///
/// Every package is attempted; the command fails if any of them did.
pub fn cmd_create(packages: &[String], release: bool, build_root: &Path) -> Result<()> {
  let output_dir = std::env::current_dir().context("Failed to determine the current directory")?;
  let kind = if release { BuildKind::Release } else { BuildKind::Dev };

  let mut failed = 0;
  for name in packages {
    let request = BuildRequest {
      name: name.clone(),
      build_root: build_root.to_path_buf(),
      output_dir: output_dir.clone(),
      kind,
    };

    match archive::build(&request) {
      Ok(path) => status(Status::Done, &format!("Package {} has been created at {}", name, path.display())),
      Err(e) => {
        status(Status::Failed, &format!("Failed to create package {}: {}", name, e));
        failed += 1;
      }
    }
  }

  if failed > 0 {
    bail!("{} of {} package(s) could not be created", failed, packages.len());
  }
  Ok(())
}
