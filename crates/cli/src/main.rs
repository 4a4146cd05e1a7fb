mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use opkg_lib::config::ConfigOverrides;

/// opkg - Build packages from a manifest and deploy them into versioned install directories
#[derive(Parser)]
#[command(name = "opkg")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Working directory for downloaded archives, the ledger and the history log
  #[arg(long, global = true, value_name = "DIR")]
  opkg_dir: Option<PathBuf>,

  /// Configuration file (default: $OPKG_CONF or <opkg_dir>/conf/opkg.toml)
  #[arg(long, global = true, value_name = "FILE")]
  conf_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build package archives from <build_root>/<name>.yml manifests
  Create {
    /// Package names, comma separated
    #[arg(long = "pkg", value_delimiter = ',', required = true)]
    packages: Vec<String>,

    /// Build release archives named <name>-<rel_num>.tgz
    #[arg(long)]
    release: bool,

    /// Directory holding the manifests and the files they reference
    #[arg(long, default_value = ".", value_name = "DIR")]
    build_root: PathBuf,
  },

  /// Deploy local package archives into a new versioned install directory
  Deploy {
    /// Archive paths, comma separated (e.g. ./web-1.2.tgz,./api.tgz)
    #[arg(long = "pkg", value_delimiter = ',', required = true)]
    packages: Vec<PathBuf>,

    /// Root of the installs/ tree
    #[arg(long, value_name = "DIR")]
    install_root: Option<PathBuf>,

    /// Reinstall even if the archive is already the latest installation
    #[arg(short, long)]
    force: bool,

    /// Keep a timestamped copy of every file rewritten by templates and replaces
    #[arg(long)]
    backup: bool,

    /// Additional template variables, comma separated KEY=VALUE pairs
    #[arg(long, value_delimiter = ',', value_parser = parse_extra_var, value_name = "KEY=VALUE")]
    extra_vars: Vec<(String, String)>,
  },

  /// List installed packages and their current release
  Ls {
    /// Restrict the listing to these packages, comma separated
    #[arg(long = "pkg", value_delimiter = ',')]
    packages: Vec<String>,

    /// Root of the installs/ tree, used to show install locations
    #[arg(long, value_name = "DIR")]
    install_root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn parse_extra_var(s: &str) -> Result<(String, String), String> {
  let (key, value) = s
    .split_once('=')
    .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
  let key = key.trim();
  if key.is_empty() {
    return Err(format!("empty variable name in '{}'", s));
  }
  Ok((key.to_string(), value.to_string()))
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let mut overrides = ConfigOverrides {
    opkg_dir: cli.opkg_dir,
    conf_file: cli.conf_file,
    install_root: None,
  };

  match cli.command {
    Commands::Create {
      packages,
      release,
      build_root,
    } => cmd::cmd_create(&packages, release, &build_root),
    Commands::Deploy {
      packages,
      install_root,
      force,
      backup,
      extra_vars,
    } => {
      overrides.install_root = install_root;
      cmd::cmd_deploy(&overrides, &packages, force, backup, extra_vars.into_iter().collect())
    }
    Commands::Ls {
      packages,
      install_root,
      json,
    } => {
      overrides.install_root = install_root;
      cmd::cmd_ls(&overrides, &packages, json)
    }
  }
}
