//! Filesystem helpers shared by the archive builder and the deployment engine.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Resolve `path` against `base` unless it is already absolute.
pub fn resolve_under(base: &Path, path: &str) -> PathBuf {
  let candidate = Path::new(path);
  if candidate.is_absolute() {
    candidate.to_path_buf()
  } else {
    base.join(candidate)
  }
}

/// Join `path` under `base`, treating absolute paths as relative to `base`.
///
/// Returns `None` if the path climbs out of `base` through `..`.
pub fn join_contained(base: &Path, path: &str) -> Option<PathBuf> {
  let mut joined = base.to_path_buf();
  for component in Path::new(path).components() {
    match component {
      Component::Normal(part) => joined.push(part),
      Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
      Component::ParentDir => return None,
    }
  }
  Some(joined)
}

/// Copy `source` to `target` with `cp -r` semantics.
///
/// - A directory source has its *contents* copied into `target`, which is created.
/// - A file source is copied to `target`, creating parent directories. If `target`
///   is an existing directory the file is copied into it.
/// - Symlinks are recreated rather than followed.
///
/// Returns the number of files and links written.
pub fn copy_path(source: &Path, target: &Path) -> io::Result<usize> {
  let meta = fs::symlink_metadata(source)?;
  if meta.is_dir() {
    return copy_dir_contents(source, target);
  }

  let dest = match (target.is_dir(), source.file_name()) {
    (true, Some(name)) => target.join(name),
    _ => target.to_path_buf(),
  };
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent)?;
  }
  copy_entry(source, &dest, meta.file_type().is_symlink())?;
  Ok(1)
}

fn copy_dir_contents(source: &Path, target: &Path) -> io::Result<usize> {
  fs::create_dir_all(target)?;

  let mut copied = 0;
  for entry in WalkDir::new(source).min_depth(1).follow_links(false).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(source).map_err(io::Error::other)?;
    let dest = target.join(rel);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&dest)?;
    } else {
      copy_entry(entry.path(), &dest, entry.path_is_symlink())?;
      copied += 1;
    }
  }
  Ok(copied)
}

fn copy_entry(source: &Path, dest: &Path, is_symlink: bool) -> io::Result<()> {
  if is_symlink {
    let link_target = fs::read_link(source)?;
    remove_if_exists(dest)?;
    symlink(&link_target, dest)
  } else {
    if fs::symlink_metadata(dest).is_ok_and(|m| m.file_type().is_symlink()) {
      fs::remove_file(dest)?;
    }
    fs::copy(source, dest).map(|_| ())
  }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_file(path) {
    Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
    _ => Ok(()),
  }
}

/// Create a symlink at `link` pointing to `target`.
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
  #[cfg(unix)]
  {
    std::os::unix::fs::symlink(target, link)
  }
  #[cfg(windows)]
  {
    if target.is_dir() {
      std::os::windows::fs::symlink_dir(target, link)
    } else {
      std::os::windows::fs::symlink_file(target, link)
    }
  }
}

/// Point `link` at `target`, replacing any existing link in a single rename.
///
/// The link is created under a temporary name next to `link` first, so an
/// observer sees either the old link or the new one.
pub fn replace_symlink(target: &Path, link: &Path) -> io::Result<()> {
  let parent = link.parent().unwrap_or(Path::new("."));
  fs::create_dir_all(parent)?;

  let name = link
    .file_name()
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "symlink path has no file name"))?;
  let tmp = parent.join(format!(".{}.opkg-link", name.to_string_lossy()));

  remove_if_exists(&tmp)?;
  symlink(target, &tmp)?;
  if let Err(e) = fs::rename(&tmp, link) {
    let _ = fs::remove_file(&tmp);
    return Err(e);
  }
  Ok(())
}

/// Write `contents` to `path` via a temporary sibling and a rename.
///
/// The permissions of an existing file at `path` are carried over.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
  let tmp = tmp_sibling(path);
  fs::write(&tmp, contents)?;
  if let Ok(meta) = fs::metadata(path) {
    fs::set_permissions(&tmp, meta.permissions())?;
  }
  if let Err(e) = fs::rename(&tmp, path) {
    let _ = fs::remove_file(&tmp);
    return Err(e);
  }
  Ok(())
}

/// Temporary sibling path used while rewriting `path`.
pub fn tmp_sibling(path: &Path) -> PathBuf {
  let mut name = path.file_name().unwrap_or_default().to_os_string();
  name.push(".opkg-tmp");
  path.with_file_name(name)
}
