//! In-place rewriting of deployed files.
//!
//! Two rewrites are supported, both over a single file or a whole directory tree:
//! - [`resolve_variables`]: substitute `{{ NAME }}` placeholders (see [`placeholder`])
//! - [`replace_tokens`]: apply an ordered list of regular-expression replacements
//!
//! Files are processed as bytes, so configuration in a legacy encoding is rewritten
//! like any other and its non-UTF-8 bytes pass through untouched.
//!
//! Every rewritten file goes through a temporary sibling and a rename. With backups
//! enabled the original is first renamed to `<file>.<unix_secs>` (or the first free
//! `<file>.<unix_secs>.<n>`). The first failure stops the traversal.

pub mod placeholder;

use std::fs;
use std::path::{Path, PathBuf};

use regex::bytes::Regex;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::manifest::TokenPair;
use crate::util::fs::{tmp_sibling, write_atomic};
use crate::util::unix_secs;
use placeholder::Resolver;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
  #[error("path does not exist: {}", path.display())]
  NotFound { path: PathBuf },

  #[error("failed to read {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to back up {} to {}: {source}", path.display(), backup.display())]
  Backup {
    path: PathBuf,
    backup: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid token pattern '{pattern}': {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: regex::Error,
  },

  #[error("failed to traverse directory {}: {source}", path.display())]
  WalkDir {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}

/// Replace `{{ NAME }}` placeholders in `path` (a file or a directory tree).
///
/// Returns the number of files whose content changed.
pub fn resolve_variables(path: &Path, variables: &impl Resolver, backup: bool) -> Result<usize, TemplateError> {
  rewrite_tree(path, backup, |content| substitute_bytes(content, variables))
}

/// Apply `tokens` in order to `path` (a file or a directory tree).
///
/// Each pattern is a regular expression. A replacement may refer to capture groups
/// as `$1`, `${1}` or `${name}`; any other `$` is copied literally. All patterns are
/// compiled before any file is touched.
pub fn replace_tokens(path: &Path, tokens: &[TokenPair], backup: bool) -> Result<usize, TemplateError> {
  let compiled = tokens
    .iter()
    .map(|t| {
      Regex::new(&t.pattern)
        .map(|re| {
          let replacement = literal_dollars(&t.replacement, &re);
          (re, replacement)
        })
        .map_err(|e| TemplateError::Pattern {
          pattern: t.pattern.clone(),
          source: e,
        })
    })
    .collect::<Result<Vec<_>, _>>()?;

  rewrite_tree(path, backup, |content| {
    compiled.iter().fold(content.to_vec(), |text, (re, replacement)| {
      re.replace_all(&text, replacement.as_bytes()).into_owned()
    })
  })
}

/// Substitute placeholders in every valid UTF-8 run of `content`.
///
/// A placeholder never spans an invalid byte, so the runs can be handled separately.
fn substitute_bytes(content: &[u8], variables: &impl Resolver) -> Vec<u8> {
  let mut out = Vec::with_capacity(content.len());
  for chunk in content.utf8_chunks() {
    out.extend_from_slice(placeholder::substitute(chunk.valid(), variables).as_bytes());
    out.extend_from_slice(chunk.invalid());
  }
  out
}

/// Escape every `$` in `replacement` that does not name a capture group of `re`.
fn literal_dollars(replacement: &str, re: &Regex) -> String {
  let is_group = |name: &str| match name.parse::<usize>() {
    Ok(index) => index < re.captures_len(),
    Err(_) => re.capture_names().flatten().any(|n| n == name),
  };

  let mut out = String::with_capacity(replacement.len());
  let mut rest = replacement;
  while let Some(pos) = rest.find('$') {
    out.push_str(&rest[..pos]);
    let after = &rest[pos + 1..];
    // (group name, length of the reference after the '$')
    let reference = match after.strip_prefix('{') {
      Some(braced) => braced.find('}').map(|end| (&braced[..end], end + 2)),
      None => {
        let len = after
          .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
          .unwrap_or(after.len());
        (len > 0).then(|| (&after[..len], len))
      }
    };

    match reference {
      Some((name, len)) if is_group(name) => {
        out.push('$');
        out.push_str(&after[..len]);
        rest = &after[len..];
      }
      _ => {
        out.push_str("$$");
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

fn rewrite_tree(path: &Path, backup: bool, rewrite: impl Fn(&[u8]) -> Vec<u8>) -> Result<usize, TemplateError> {
  if fs::symlink_metadata(path).is_err() {
    return Err(TemplateError::NotFound { path: path.to_path_buf() });
  }

  let mut changed = 0;
  for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
    let entry = entry.map_err(|e| TemplateError::WalkDir {
      path: path.to_path_buf(),
      source: e,
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    if rewrite_file(entry.path(), backup, &rewrite)? {
      changed += 1;
    }
  }

  debug!(path = ?path, changed, "rewrote files");
  Ok(changed)
}

fn rewrite_file(path: &Path, backup: bool, rewrite: &impl Fn(&[u8]) -> Vec<u8>) -> Result<bool, TemplateError> {
  let content = fs::read(path).map_err(|e| TemplateError::Read {
    path: path.to_path_buf(),
    source: e,
  })?;

  let rewritten = rewrite(&content);
  if rewritten == content {
    return Ok(false);
  }

  if backup {
    let backup_path = backup_path(path);
    fs::rename(path, &backup_path).map_err(|e| TemplateError::Backup {
      path: path.to_path_buf(),
      backup: backup_path.clone(),
      source: e,
    })?;
    // The original is now at backup_path; write the new content under the old name.
    write_new(path, &backup_path, &rewritten)?;
  } else {
    write_atomic(path, &rewritten).map_err(|e| TemplateError::Write {
      path: path.to_path_buf(),
      source: e,
    })?;
  }

  trace!(path = ?path, backup, "rewrote file");
  Ok(true)
}

/// Write `contents` to `path` after the original was moved to `original`,
/// keeping the original's permissions.
fn write_new(path: &Path, original: &Path, contents: &[u8]) -> Result<(), TemplateError> {
  let write_err = |e| TemplateError::Write {
    path: path.to_path_buf(),
    source: e,
  };
  let tmp = tmp_sibling(path);
  fs::write(&tmp, contents).map_err(write_err)?;
  if let Ok(meta) = fs::metadata(original) {
    fs::set_permissions(&tmp, meta.permissions()).map_err(write_err)?;
  }
  fs::rename(&tmp, path).map_err(write_err)
}

/// `<file>.<unix_secs>`, or `<file>.<unix_secs>.<n>` when earlier backups exist.
fn backup_path(path: &Path) -> PathBuf {
  let mut base = path.file_name().unwrap_or_default().to_os_string();
  base.push(format!(".{}", unix_secs()));

  let mut candidate = path.with_file_name(&base);
  let mut n = 1;
  while fs::symlink_metadata(&candidate).is_ok() {
    let mut name = base.clone();
    name.push(format!(".{n}"));
    candidate = path.with_file_name(name);
    n += 1;
  }
  candidate
}
