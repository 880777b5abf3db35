//! Glob patterns over dotted state names.
//!
//! A pattern is split on `.`:
//! - `*` matches exactly one segment,
//! - `**` matches zero or more segments,
//! - anything else matches the segment literally.
//!
//! Patterns compile to anchored regular expressions.
//!
//! ```
//! use arbor_core::glob::Glob;
//!
//! let glob = Glob::new("*.detail").unwrap();
//! assert!(glob.matches("user.detail"));
//! assert!(!glob.matches("user.list.detail"));
//! ```

use crate::error::StateError;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct Glob {
    text: String,
    regex: Regex,
}

impl Glob {
    pub fn new(text: &str) -> Result<Self, StateError> {
        let pattern: String = text
            .split('.')
            .map(|segment| match segment {
                "**" => r"(?:|(?:\.[^.]*)*)".to_string(),
                "*" => r"\.[^.]*".to_string(),
                literal => format!(r"\.{}", regex::escape(literal)),
            })
            .collect();

        let regex = Regex::new(&format!("^{pattern}$"))
            .map_err(|_| StateError::InvalidGlob(text.to_string()))?;

        Ok(Self {
            text: text.to_string(),
            regex,
        })
    }

    /// Whether `text` contains a wildcard segment.
    pub fn is_glob(text: &str) -> bool {
        text.contains('*')
    }

    /// Compile `text` only if it is a glob.
    pub fn from_glob_str(text: &str) -> Option<Self> {
        if Self::is_glob(text) {
            Self::new(text).ok()
        } else {
            None
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(&format!(".{name}"))
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Match `name` against `pattern`, treating non-glob patterns as exact names.
pub fn name_matches(pattern: &str, name: &str) -> bool {
    match Glob::from_glob_str(pattern) {
        Some(glob) => glob.matches(name),
        None => pattern == name,
    }
}
