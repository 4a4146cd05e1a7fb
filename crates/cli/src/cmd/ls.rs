//! Implementation of the `opkg ls` command.
//!
//! Lists the current release of each installed package as recorded in the ledger.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use opkg_lib::config::{Config, ConfigOverrides};
use opkg_lib::ledger::{InstallRecord, Ledger};
use opkg_lib::platform::paths;

use crate::output::{ARROW, Status, print_json, short_hash, stat, status};

#[derive(Debug, Serialize)]
struct PackageListing {
  name: String,
  installed: bool,
  release_id: Option<String>,
  release_timestamp: Option<String>,
  content_hash: Option<String>,
  deploy_stamp: Option<u64>,
  location: Option<PathBuf>,
}

impl PackageListing {
  fn new(name: &str, latest: Option<InstallRecord>, install_root: Option<&PathBuf>) -> Self {
    match latest {
      Some(record) => Self {
        name: name.to_string(),
        installed: true,
        location: install_root.map(|root| paths::deploy_dir(root, record.deploy_stamp, name)),
        deploy_stamp: Some(record.deploy_stamp),
        release_id: Some(record.release_id),
        release_timestamp: Some(record.release_timestamp),
        content_hash: Some(record.content_hash.0),
      },
      None => Self {
        name: name.to_string(),
        installed: false,
        release_id: None,
        release_timestamp: None,
        content_hash: None,
        deploy_stamp: None,
        location: None,
      },
    }
  }
}

/// Execute the ls command.
///
/// Without `--pkg`, every package that has a ledger directory is listed. The install
/// root is optional here; when known, the deploy directory of each release is shown.
pub fn cmd_ls(overrides: &ConfigOverrides, packages: &[String], json: bool) -> Result<()> {
  let config = Config::load(overrides).context("Failed to load configuration")?;
  let ledger = Ledger::new(&config.opkg_dir);

  let names = if packages.is_empty() {
    ledger.installed_packages().context("Failed to list installed packages")?
  } else {
    packages.to_vec()
  };

  let listings: Vec<PackageListing> = names
    .iter()
    .map(|name| PackageListing::new(name, ledger.latest(name), config.install_root.as_ref()))
    .collect();

  if json {
    return print_json(&listings);
  }

  if listings.is_empty() {
    status(Status::Note, "No packages installed");
    return Ok(());
  }

  for listing in &listings {
    let Some(release) = &listing.release_id else {
      status(Status::Missing, &format!("{} is not installed", listing.name));
      continue;
    };

    match &listing.location {
      Some(location) => status(Status::Note, &format!(
        "{}-{} {} {}",
        listing.name,
        release,
        ARROW,
        location.display()
      )),
      None => status(Status::Note, &format!("{}-{}", listing.name, release)),
    }
    if let Some(hash) = &listing.content_hash {
      stat("Hash", short_hash(hash));
    }
  }

  Ok(())
}
