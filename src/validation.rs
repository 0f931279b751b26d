//! Name validation for categories, implementations and queue names.

use crate::types::{Error, Result};

/// Longest accepted name, in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::invalid_argument(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate a name that becomes a queue path component.
///
/// Must be non-empty, at most [`MAX_NAME_LEN`] bytes, and free of path
/// separators and control characters.
pub fn validate_name(s: &str, field: &str) -> Result<()> {
    validate_non_empty(s, field)?;
    if s.len() > MAX_NAME_LEN {
        return Err(Error::invalid_argument(format!(
            "{} exceeds {} bytes",
            field, MAX_NAME_LEN
        )));
    }
    if s == "." || s == ".." || s.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(Error::invalid_argument(format!(
            "{} '{}' is not a valid name",
            field,
            s.escape_debug()
        )));
    }
    Ok(())
}
