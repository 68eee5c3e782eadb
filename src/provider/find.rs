//! # Name Matching
//!
//! Compiles a find-query name pattern once and matches whole secret names
//! against it.

use regex::Regex;

use crate::error::{Result, SyncError};

/// Compiled name filter
#[derive(Debug, Clone)]
pub struct NameMatcher {
    pattern: String,
    regex: Regex,
}

impl NameMatcher {
    /// Compile `pattern` as a regular expression anchored at both ends
    ///
    /// # Errors
    /// `InvalidPattern` when the expression does not compile.
    pub fn compile(pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored).map_err(|e| SyncError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Whether `name` matches the whole pattern
    #[must_use]
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Compile an optional pattern
///
/// # Errors
/// See [`NameMatcher::compile`].
pub fn compile_optional(pattern: Option<&str>) -> Result<Option<NameMatcher>> {
    pattern.map(NameMatcher::compile).transpose()
}
