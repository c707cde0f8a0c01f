//! Ignore patterns.

use glob::{MatchOptions, Pattern};
use hoist_core::{Error, Result};
use std::path::{Path, PathBuf};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A set of glob patterns. An entry is ignored when any pattern matches its
/// path relative to the tree root, or its file name.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<Pattern>,
    names: Vec<String>,
    paths: Vec<PathBuf>,
}

impl IgnoreFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                Pattern::new(p.trim())
                    .map_err(|e| Error::Validation(format!("Invalid ignore pattern `{}`: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            ..Self::default()
        })
    }

    /// Also ignore every entry with exactly this file name.
    pub fn exclude_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Also ignore the entry at exactly this path relative to the root.
    pub fn exclude_path(mut self, relative: impl Into<PathBuf>) -> Self {
        self.paths.push(relative.into());
        self
    }

    pub fn is_ignored(&self, relative: &Path) -> bool {
        if self.paths.iter().any(|p| p == relative) {
            return true;
        }

        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.names.iter().any(|n| *n == file_name) {
            return true;
        }

        let relative = relative.to_string_lossy();
        self.patterns.iter().any(|p| {
            p.matches_with(&relative, MATCH_OPTIONS) || p.matches_with(&file_name, MATCH_OPTIONS)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.names.is_empty() && self.paths.is_empty()
    }
}
