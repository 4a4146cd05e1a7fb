//! Terminal output for opkg commands.
//!
//! Every command reports one status line per package, followed by indented
//! stats. Successes and notes go to stdout, failures and warnings to stderr.

use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

/// Separator between a package release and its install location.
pub const ARROW: &str = "→";

/// Outcome shown at the start of a package status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Done,
  Failed,
  Missing,
  Note,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Status::Done => "✓",
      Status::Failed => "✗",
      Status::Missing => "⚠",
      Status::Note => "•",
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Status::Failed | Status::Missing)
  }
}

/// Print `message` behind the symbol for `kind`.
pub fn status(kind: Status, message: &str) {
  let symbol = kind.symbol();
  if !kind.to_stderr() {
    let symbol = match kind {
      Status::Done => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
      _ => symbol.if_supports_color(Stream::Stdout, |s| s.blue()).to_string(),
    };
    println!("{symbol} {message}");
    return;
  }

  let (symbol, message) = match kind {
    Status::Failed => (
      symbol.if_supports_color(Stream::Stderr, |s| s.red()).to_string(),
      message.if_supports_color(Stream::Stderr, |s| s.red()).to_string(),
    ),
    _ => (
      symbol.if_supports_color(Stream::Stderr, |s| s.yellow()).to_string(),
      message.if_supports_color(Stream::Stderr, |s| s.yellow()).to_string(),
    ),
  };
  eprintln!("{symbol} {message}");
}

/// Print an indented `label: value` line under a status line.
pub fn stat(label: &str, value: impl std::fmt::Display) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}

/// Leading 12 characters of an archive hash.
pub fn short_hash(hash: &str) -> &str {
  hash.get(..12).unwrap_or(hash)
}

/// Elapsed time as `850ms`, `1.50s` or `1m 5s`.
pub fn elapsed(duration: Duration) -> String {
  let secs = duration.as_secs();
  match secs {
    0 => format!("{}ms", duration.subsec_millis()),
    1..60 => format!("{}.{:02}s", secs, duration.subsec_millis() / 10),
    _ => format!("{}m {}s", secs / 60, secs % 60),
  }
}
