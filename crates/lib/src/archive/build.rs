use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::ArchiveError;
use crate::consts::{BUILD_STAGING_DIR, MANIFEST_EXT, META_DIR};
use crate::manifest::{BuildKind, Manifest};
use crate::package::{archive_file_name, validate_name};
use crate::util::fs::{copy_path, join_contained, resolve_under};

/// What to build and where to put it.
#[derive(Debug, Clone)]
pub struct BuildRequest {
  pub name: String,
  /// Directory holding `<name>.yml` and the package sources.
  pub build_root: PathBuf,
  /// Directory receiving the finished archive.
  pub output_dir: PathBuf,
  pub kind: BuildKind,
}

impl BuildRequest {
  pub fn manifest_path(&self) -> PathBuf {
    self.build_root.join(format!("{}.{MANIFEST_EXT}", self.name))
  }

  pub fn staging_dir(&self) -> PathBuf {
    self.build_root.join(BUILD_STAGING_DIR).join(&self.name)
  }
}

/// Build the archive for `request` and return its path.
///
/// On failure the staging tree is left in place for inspection.
pub fn build(request: &BuildRequest) -> Result<PathBuf, ArchiveError> {
  validate_name(&request.name)?;
  let manifest_path = request.manifest_path();
  let manifest = Manifest::load(&manifest_path, request.kind)?;

  let stage_dir = request.staging_dir();
  info!(package = %request.name, kind = ?request.kind, stage = ?stage_dir, "building package");
  reset_dir(&stage_dir)?;

  let meta_dir = stage_dir.join(META_DIR);
  fs::create_dir_all(&meta_dir).map_err(|e| ArchiveError::Stage {
    path: meta_dir.clone(),
    source: e,
  })?;
  let staged_manifest = meta_dir.join(format!("{}.{MANIFEST_EXT}", request.name));
  fs::copy(&manifest_path, &staged_manifest).map_err(|e| ArchiveError::Copy {
    from: manifest_path.clone(),
    to: staged_manifest.clone(),
    source: e,
  })?;

  for pair in manifest.files() {
    let source = resolve_under(&request.build_root, &pair.source);
    let target = join_contained(&stage_dir, &pair.target).ok_or_else(|| ArchiveError::TargetEscapes {
      target: pair.target.clone(),
    })?;
    let copied = copy_path(&source, &target).map_err(|e| ArchiveError::Copy {
      from: source.clone(),
      to: target.clone(),
      source: e,
    })?;
    debug!(source = ?source, target = %pair.target, copied, "staged file");
  }

  let release = match request.kind {
    BuildKind::Release => manifest.release_id(),
    BuildKind::Dev => None,
  };
  let file_name = archive_file_name(&request.name, release);
  let partial = request
    .build_root
    .join(BUILD_STAGING_DIR)
    .join(format!("{file_name}.partial"));
  compress(&stage_dir, &partial)?;

  fs::create_dir_all(&request.output_dir).map_err(|e| ArchiveError::Publish {
    path: request.output_dir.clone(),
    source: e,
  })?;
  let dest = request.output_dir.join(&file_name);
  publish(&partial, &dest)?;

  if let Err(e) = fs::remove_dir_all(&stage_dir) {
    warn!(path = ?stage_dir, error = %e, "failed to remove staging directory");
  }

  info!(package = %request.name, archive = ?dest, "package built");
  Ok(dest)
}

fn reset_dir(dir: &Path) -> Result<(), ArchiveError> {
  let stage_err = |e| ArchiveError::Stage {
    path: dir.to_path_buf(),
    source: e,
  };
  if dir.exists() {
    fs::remove_dir_all(dir).map_err(stage_err)?;
  }
  fs::create_dir_all(dir).map_err(stage_err)
}

/// Write `stage_dir` as a gzip tar at `archive`, entries sorted and relative to `stage_dir`.
fn compress(stage_dir: &Path, archive: &Path) -> Result<(), ArchiveError> {
  let compress_err = |e| ArchiveError::Compress {
    path: archive.to_path_buf(),
    source: e,
  };

  let file = File::create(archive).map_err(compress_err)?;
  let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
  let mut builder = tar::Builder::new(encoder);
  builder.follow_symlinks(false);

  for entry in WalkDir::new(stage_dir).min_depth(1).follow_links(false).sort_by_file_name() {
    let entry = entry.map_err(|e| compress_err(std::io::Error::other(e)))?;
    let rel = entry
      .path()
      .strip_prefix(stage_dir)
      .map_err(|e| compress_err(std::io::Error::other(e)))?;

    if entry.file_type().is_dir() {
      builder.append_dir(rel, entry.path()).map_err(compress_err)?;
    } else {
      builder.append_path_with_name(entry.path(), rel).map_err(compress_err)?;
    }
  }

  let encoder = builder.into_inner().map_err(compress_err)?;
  encoder.finish().map_err(compress_err)?;
  Ok(())
}

fn publish(partial: &Path, dest: &Path) -> Result<(), ArchiveError> {
  let publish_err = |e| ArchiveError::Publish {
    path: dest.to_path_buf(),
    source: e,
  };
  if fs::rename(partial, dest).is_ok() {
    return Ok(());
  }
  // Different filesystem: copy, then drop the partial file.
  fs::copy(partial, dest).map_err(publish_err)?;
  fs::remove_file(partial).map_err(publish_err)
}
