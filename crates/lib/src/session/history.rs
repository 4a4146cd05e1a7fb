use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only deployment history, one `<deploy_stamp>: <message>` line per event.
#[derive(Debug, Clone)]
pub struct HistoryLog {
  path: PathBuf,
  stamp: u64,
}

impl HistoryLog {
  pub fn new(path: PathBuf, stamp: u64) -> Self {
    Self { path, stamp }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn append(&self, message: &str) -> io::Result<()> {
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    writeln!(file, "{}: {}", self.stamp, message)
  }
}
