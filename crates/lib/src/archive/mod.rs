//! Package archives.
//!
//! A package archive is a gzip-compressed tar of the package's declared file set
//! at target-relative paths, plus the manifest it was built from:
//!
//! ```text
//! web-1.4.tgz
//!   .deploy/web.yml
//!   bin/app.sh
//!   conf/app.conf
//! ```

mod build;
mod unpack;

pub use build::{BuildRequest, build};
pub use unpack::unpack;

use std::path::PathBuf;

use crate::manifest::ManifestError;
use crate::package::PackageError;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
  #[error(transparent)]
  Package(#[from] PackageError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("failed to prepare staging directory {}: {source}", path.display())]
  Stage {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("file target escapes the package: {target}")]
  TargetEscapes { target: String },

  #[error("failed to write archive {}: {source}", path.display())]
  Compress {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to move archive to {}: {source}", path.display())]
  Publish {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to extract {}: {source}", path.display())]
  Extract {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("archive {} contains an entry outside the destination: {entry}", path.display())]
  UnsafeEntry { path: PathBuf, entry: String },
}
