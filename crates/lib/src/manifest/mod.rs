//! Package manifest model.
//!
//! A manifest is a YAML mapping describing how a package is built and deployed:
//!
//! ```yaml
//! rel_num: 1.4.0
//! files:
//!   - bin/app.sh:src/app.sh
//!   - conf:conf
//! targets:
//!   - bin:bin
//! templates:
//!   - conf/app.conf
//! replaces:
//!   conf/app.ini:
//!     - "HOST=.*": "HOST=prod.example.com"
//! symlinks:
//!   - current:bin
//! permissions:
//!   - bin/app.sh:root:root 0755
//! pre_deploy:
//!   - ./check.sh
//! post_deploy:
//!   - echo deployed
//! ```
//!
//! Every section is optional and keeps declaration order. Entries are written
//! either as plain strings or as single-key mappings, which are flattened to
//! `key:value`. All entries are validated into typed values when the manifest
//! is loaded, so a manifest that loads successfully cannot fail later on shape.

mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

/// Key holding the release identifier.
pub const RELEASE_KEY: &str = "rel_num";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
  #[error("failed to read manifest {}: {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest {origin}: {message}")]
  Parse { origin: String, message: String },

  #[error("invalid manifest {origin}: {message}")]
  Schema { origin: String, message: String },
}

impl ManifestError {
  fn schema(origin: &str, message: impl Into<String>) -> Self {
    ManifestError::Schema {
      origin: origin.to_string(),
      message: message.into(),
    }
  }
}

/// A validated package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
  release_id: Option<String>,
  entries: BTreeMap<Section, Vec<String>>,
  files: Vec<PathPair>,
  targets: Vec<PathPair>,
  symlinks: Vec<PathPair>,
  templates: Vec<String>,
  pre_deploy: Vec<String>,
  post_deploy: Vec<String>,
  permissions: Vec<PermissionEntry>,
  replaces: Vec<ReplaceEntry>,
}

impl Manifest {
  /// Read and validate the manifest at `path`.
  pub fn load(path: &Path, kind: BuildKind) -> Result<Self, ManifestError> {
    let text = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
      path: path.to_path_buf(),
      source: e,
    })?;
    Self::parse(&text, &path.display().to_string(), kind)
  }

  /// Validate manifest text held in memory.
  pub fn parse_str(text: &str, kind: BuildKind) -> Result<Self, ManifestError> {
    Self::parse(text, "<inline>", kind)
  }

  fn parse(text: &str, origin: &str, kind: BuildKind) -> Result<Self, ManifestError> {
    let document: Value = serde_yaml::from_str(text).map_err(|e| ManifestError::Parse {
      origin: origin.to_string(),
      message: e.to_string(),
    })?;

    let root = match document {
      Value::Mapping(map) => map,
      Value::Null => Mapping::new(),
      _ => {
        return Err(ManifestError::Parse {
          origin: origin.to_string(),
          message: "top level must be a mapping".to_string(),
        });
      }
    };

    let mut manifest = Manifest::default();
    for (key, value) in &root {
      let Some(key) = key.as_str() else {
        return Err(ManifestError::schema(origin, "top-level keys must be strings"));
      };
      if key == RELEASE_KEY {
        manifest.release_id = release_id(value).ok_or_else(|| {
          ManifestError::schema(origin, format!("'{RELEASE_KEY}' must be a string or a number"))
        })?;
        continue;
      }
      match Section::from_key(key) {
        Some(section) => manifest.load_section(origin, section, value)?,
        None => debug!(origin, key, "ignoring unknown manifest key"),
      }
    }

    if kind == BuildKind::Release {
      match manifest.release_id.as_deref() {
        None => return Err(ManifestError::schema(origin, "missing releaseId")),
        Some(id) if id.is_empty() || id.contains(['-', '/', '\\']) => {
          return Err(ManifestError::schema(
            origin,
            format!("invalid releaseId '{id}': must be non-empty and contain no '-' or path separators"),
          ));
        }
        Some(_) => {}
      }
    }

    Ok(manifest)
  }

  fn load_section(&mut self, origin: &str, section: Section, value: &Value) -> Result<(), ManifestError> {
    if section == Section::Replaces {
      return self.load_replaces(origin, value);
    }

    let items = match value {
      Value::Sequence(items) => items.as_slice(),
      Value::Null => &[],
      _ => return Err(ManifestError::schema(origin, format!("'{section}' must be a list"))),
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
      let entry = normalize_entry(item)
        .ok_or_else(|| ManifestError::schema(origin, format!("unsupported entry in '{section}': {item:?}")))?;
      entries.push(entry);
    }

    let invalid = |entry: &str| ManifestError::schema(origin, format!("malformed entry in '{section}': {entry}"));
    match section {
      Section::Files | Section::Targets | Section::Symlinks => {
        let pairs = entries
          .iter()
          .map(|e| PathPair::parse(e).ok_or_else(|| invalid(e)))
          .collect::<Result<Vec<_>, _>>()?;
        match section {
          Section::Files => self.files = pairs,
          Section::Targets => self.targets = pairs,
          _ => self.symlinks = pairs,
        }
      }
      Section::Permissions => {
        self.permissions = entries
          .iter()
          .map(|e| PermissionEntry::parse(e).ok_or_else(|| invalid(e)))
          .collect::<Result<Vec<_>, _>>()?;
      }
      Section::Templates => self.templates = entries.clone(),
      Section::PreDeploy => self.pre_deploy = entries.clone(),
      Section::PostDeploy => self.post_deploy = entries.clone(),
      Section::Replaces => {}
    }

    self.entries.insert(section, entries);
    Ok(())
  }

  fn load_replaces(&mut self, origin: &str, value: &Value) -> Result<(), ManifestError> {
    let files = match value {
      Value::Mapping(files) => files,
      Value::Null => {
        self.entries.insert(Section::Replaces, Vec::new());
        return Ok(());
      }
      _ => return Err(ManifestError::schema(origin, "'replaces' must map file paths to token lists")),
    };

    let mut names = Vec::with_capacity(files.len());
    for (file, tokens) in files {
      let Some(file) = file.as_str() else {
        return Err(ManifestError::schema(origin, "'replaces' keys must be file paths"));
      };
      let Value::Sequence(tokens) = tokens else {
        return Err(ManifestError::schema(origin, format!("'replaces.{file}' must be a list")));
      };

      let tokens = tokens
        .iter()
        .map(|t| {
          token_pair(t).ok_or_else(|| ManifestError::schema(origin, format!("malformed token in 'replaces.{file}': {t:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

      names.push(file.to_string());
      self.replaces.push(ReplaceEntry {
        file: file.to_string(),
        tokens,
      });
    }

    self.entries.insert(Section::Replaces, names);
    Ok(())
  }

  /// The release identifier (`rel_num`), if declared.
  pub fn release_id(&self) -> Option<&str> {
    self.release_id.as_deref()
  }

  /// Normalized entries of `section`, or `None` if the manifest does not declare it.
  ///
  /// For `replaces` these are the file paths, in declaration order.
  pub fn section_entries(&self, section: Section) -> Option<&[String]> {
    self.entries.get(&section).map(Vec::as_slice)
  }

  pub fn files(&self) -> &[PathPair] {
    &self.files
  }

  pub fn targets(&self) -> &[PathPair] {
    &self.targets
  }

  pub fn symlinks(&self) -> &[PathPair] {
    &self.symlinks
  }

  pub fn templates(&self) -> &[String] {
    &self.templates
  }

  pub fn pre_deploy(&self) -> &[String] {
    &self.pre_deploy
  }

  pub fn post_deploy(&self) -> &[String] {
    &self.post_deploy
  }

  pub fn permissions(&self) -> &[PermissionEntry] {
    &self.permissions
  }

  pub fn replaces(&self) -> &[ReplaceEntry] {
    &self.replaces
  }
}

fn release_id(value: &Value) -> Option<Option<String>> {
  match value {
    Value::String(s) => Some(Some(s.clone())),
    Value::Number(n) => Some(Some(n.to_string())),
    Value::Null => Some(None),
    _ => None,
  }
}

/// Scalars verbatim; single-key mappings as `key:value`.
fn normalize_entry(item: &Value) -> Option<String> {
  match item {
    Value::String(s) => Some(s.clone()),
    Value::Mapping(map) if map.len() == 1 => {
      let (key, value) = map.iter().next()?;
      Some(format!("{}:{}", scalar(key)?, scalar(value)?))
    }
    _ => None,
  }
}

fn scalar(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn token_pair(item: &Value) -> Option<TokenPair> {
  match item {
    Value::Mapping(map) if map.len() == 1 => {
      let (pattern, replacement) = map.iter().next()?;
      Some(TokenPair {
        pattern: scalar(pattern)?,
        replacement: scalar(replacement)?,
      })
    }
    Value::String(s) => {
      let (pattern, replacement) = s.split_once(':')?;
      Some(TokenPair {
        pattern: pattern.to_string(),
        replacement: replacement.to_string(),
      })
    }
    _ => None,
  }
}
