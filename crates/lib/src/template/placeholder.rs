//! Placeholder parsing and substitution for `{{ NAME }}` template variables.
//!
//! # Placeholder Format
//!
//! `{{ NAME }}` where `NAME` is made of ASCII letters, digits, `_`, `.` and `-`.
//! Whitespace around the name is optional, so `{{NAME}}` and `{{  NAME  }}` are
//! the same placeholder.
//!
//! Anything that is not a well-formed placeholder (an unclosed `{{`, an empty or
//! invalid name) is literal text. Parsing never fails.
//!
//! # Example
//!
//! ```
//! use opkg_lib::template::placeholder::{parse, Segment};
//!
//! let segments = parse("listen {{ PORT }};");
//! assert_eq!(segments, vec![
//!     Segment::Literal("listen ".to_string()),
//!     Segment::Variable { name: "PORT".to_string(), raw: "{{ PORT }}".to_string() },
//!     Segment::Literal(";".to_string()),
//! ]);
//! ```

use std::collections::{BTreeMap, HashMap};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A variable reference, with the exact source text it was parsed from
  Variable { name: String, raw: String },
}

/// Looks up variable values during substitution.
pub trait Resolver {
  fn resolve(&self, name: &str) -> Option<&str>;
}

impl Resolver for BTreeMap<String, String> {
  fn resolve(&self, name: &str) -> Option<&str> {
    self.get(name).map(String::as_str)
  }
}

impl Resolver for HashMap<String, String> {
  fn resolve(&self, name: &str) -> Option<&str> {
    self.get(name).map(String::as_str)
  }
}

fn is_valid_name(name: &str) -> bool {
  !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Parse a string containing placeholders into segments.
pub fn parse(input: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut rest = input;

  while let Some(start) = rest.find(OPEN) {
    literal.push_str(&rest[..start]);
    let after_open = &rest[start + OPEN.len()..];

    let Some(end) = after_open.find(CLOSE) else {
      // Unclosed: everything from here on is literal
      literal.push_str(&rest[start..]);
      rest = "";
      break;
    };

    let name = after_open[..end].trim();
    if is_valid_name(name) {
      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }
      let raw_len = OPEN.len() + end + CLOSE.len();
      segments.push(Segment::Variable {
        name: name.to_string(),
        raw: rest[start..start + raw_len].to_string(),
      });
      rest = &rest[start + raw_len..];
    } else {
      // Keep the braces and rescan just past them, so `{{ x {{ Y }}` still finds `Y`
      literal.push_str(OPEN);
      rest = after_open;
    }
  }

  literal.push_str(rest);
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  segments
}

/// Substitute all placeholders in a string using the provided resolver.
///
/// This is a convenience function that parses and substitutes in one step.
pub fn substitute(input: &str, resolver: &impl Resolver) -> String {
  substitute_segments(&parse(input), resolver)
}

/// Substitute placeholders in pre-parsed segments.
///
/// Variables that are unbound, or bound to an empty value, are emitted verbatim.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> String {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Variable { name, raw } => match resolver.resolve(name).filter(|v| !v.is_empty()) {
        Some(value) => result.push_str(value),
        None => result.push_str(raw),
      },
    }
  }

  result
}
