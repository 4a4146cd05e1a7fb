use std::fmt;

use serde::Serialize;

/// Whether a manifest is loaded for a development or a release build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
  Dev,
  Release,
}

/// The list-valued sections a manifest may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Section {
  Files,
  Targets,
  Templates,
  Replaces,
  Symlinks,
  Permissions,
  PreDeploy,
  PostDeploy,
}

impl Section {
  pub const ALL: [Section; 8] = [
    Section::Files,
    Section::Targets,
    Section::Templates,
    Section::Replaces,
    Section::Symlinks,
    Section::Permissions,
    Section::PreDeploy,
    Section::PostDeploy,
  ];

  /// The YAML key naming this section.
  pub fn key(self) -> &'static str {
    match self {
      Section::Files => "files",
      Section::Targets => "targets",
      Section::Templates => "templates",
      Section::Replaces => "replaces",
      Section::Symlinks => "symlinks",
      Section::Permissions => "permissions",
      Section::PreDeploy => "pre_deploy",
      Section::PostDeploy => "post_deploy",
    }
  }

  pub fn from_key(key: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|s| s.key() == key)
  }
}

impl fmt::Display for Section {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

/// A `target:source` entry from `files`, `targets` or `symlinks`.
///
/// For `symlinks`, `target` is the link path and `source` the path it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathPair {
  pub target: String,
  pub source: String,
}

impl PathPair {
  /// Split `target:source` at the first colon.
  pub fn parse(entry: &str) -> Option<Self> {
    let (target, source) = entry.split_once(':')?;
    let (target, source) = (target.trim(), source.trim());
    if target.is_empty() || source.is_empty() {
      return None;
    }
    Some(Self {
      target: target.to_string(),
      source: source.to_string(),
    })
  }
}

/// A `path:owner:group mode` entry from `permissions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionEntry {
  pub path: String,
  pub owner: String,
  pub group: String,
  /// Unix permission bits, parsed from octal.
  pub mode: u32,
}

impl PermissionEntry {
  /// Parse `path:owner:group mode`, splitting on colons and spaces.
  pub fn parse(entry: &str) -> Option<Self> {
    let fields: Vec<&str> = entry.split([' ', ':']).filter(|f| !f.is_empty()).collect();
    let [path, owner, group, mode] = fields.as_slice() else {
      return None;
    };
    let mode = u32::from_str_radix(mode, 8).ok().filter(|m| *m <= 0o7777)?;
    Some(Self {
      path: path.to_string(),
      owner: owner.to_string(),
      group: group.to_string(),
      mode,
    })
  }
}

/// A literal replacement applied by the `replaces` section.
///
/// `pattern` is a regular expression; `replacement` may reference capture groups as `$1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
  pub pattern: String,
  pub replacement: String,
}

/// All token replacements for one path under the deploy directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceEntry {
  pub file: String,
  pub tokens: Vec<TokenPair>,
}
