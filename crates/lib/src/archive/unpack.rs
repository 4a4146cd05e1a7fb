use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use super::ArchiveError;

/// Extract the gzip tar at `archive` into `dest`, returning the number of entries.
///
/// Entries with absolute paths or `..` components are rejected.
pub fn unpack(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
  let extract_err = |e| ArchiveError::Extract {
    path: archive.to_path_buf(),
    source: e,
  };

  fs::create_dir_all(dest).map_err(extract_err)?;
  let file = File::open(archive).map_err(extract_err)?;
  let decoder = GzDecoder::new(BufReader::new(file));
  let mut tar = Archive::new(decoder);
  tar.set_preserve_permissions(true);

  let mut count = 0;
  for entry in tar.entries().map_err(extract_err)? {
    let mut entry = entry.map_err(extract_err)?;
    let path = entry.path().map_err(extract_err)?.into_owned();

    if path
      .components()
      .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
      return Err(ArchiveError::UnsafeEntry {
        path: archive.to_path_buf(),
        entry: path.display().to_string(),
      });
    }

    let unpacked = entry.unpack_in(dest).map_err(extract_err)?;
    if !unpacked {
      return Err(ArchiveError::UnsafeEntry {
        path: archive.to_path_buf(),
        entry: path.display().to_string(),
      });
    }
    count += 1;
  }

  debug!(archive = ?archive, dest = ?dest, entries = count, "unpacked archive");
  Ok(count)
}
