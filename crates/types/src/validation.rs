//! Path validation for node names.
//!
//! Node paths are absolute, slash-separated, and Unicode. A valid path:
//! - starts with `/`
//! - has no empty segments and no trailing `/` (except the root itself)
//! - has no `.` or `..` segments
//! - contains no NUL, control characters, surrogates or private-use code points
//! - does not exceed the configured byte limit
//!
//! The prepare stage maps a [`ValidationError`] to a bad-arguments failure.

use std::fmt;

/// Validation error with structured context.
///
/// Contains the specific constraint that was violated and the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl ValidationError {
    fn path(constraint: impl Into<String>) -> Self {
        Self { field: "path".to_string(), constraint: constraint.into() }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Validates a node path.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first violated rule.
pub fn validate_path(path: &str, max_path_bytes: usize) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::path("must not be empty"));
    }
    if path.len() > max_path_bytes {
        return Err(ValidationError::path(format!(
            "length {} bytes exceeds maximum {} bytes",
            path.len(),
            max_path_bytes
        )));
    }
    if !path.starts_with('/') {
        return Err(ValidationError::path("must start with /"));
    }
    if path.len() == 1 {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(ValidationError::path("must not end with /"));
    }

    for (index, segment) in path[1..].split('/').enumerate() {
        if segment.is_empty() {
            return Err(ValidationError::path(format!("empty node name in segment {index}")));
        }
        if segment == "." || segment == ".." {
            return Err(ValidationError::path(format!(
                "relative segment {segment:?} is not allowed"
            )));
        }
        if let Some(c) = segment.chars().find(|&c| !is_path_char(c)) {
            return Err(ValidationError::path(format!(
                "invalid character {c:?} in segment {index}"
            )));
        }
    }
    Ok(())
}

/// Returns the parent of `path`, or `None` when `path` contains no `/`.
///
/// The parent of a top-level node is the root `/`.
pub fn parent_path(path: &str) -> Option<&str> {
    let last_slash = path.rfind('/')?;
    if last_slash == 0 { Some("/") } else { Some(&path[..last_slash]) }
}

/// Appends the zero-padded sequential suffix derived from the parent's child
/// generation counter.
pub fn sequential_path(path: &str, parent_cversion: i32) -> String {
    format!("{path}{parent_cversion:010}")
}

fn is_path_char(c: char) -> bool {
    !matches!(c,
        '\u{0000}'..='\u{001f}'
        | '\u{007f}'..='\u{009f}'
        | '\u{e000}'..='\u{f8ff}'
        | '\u{fff0}'..='\u{ffff}')
}
