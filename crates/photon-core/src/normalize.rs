//! Lenient parsers for loosely-typed settings values.
//!
//! Optional values that are empty or malformed come back as `None`; only
//! `require_string_with_message` can fail.

use std::str::FromStr;

/// A required setting value was absent or blank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MissingValue(pub String);

/// Trim a string and treat blank input as absent.
pub fn normalize_string_to_undefined(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a number, returning `None` for blank or unparseable input.
pub fn parse_number<T: FromStr>(value: Option<&str>) -> Option<T> {
    normalize_string_to_undefined(value)?.parse::<T>().ok()
}

/// Parse a boolean flag. Accepts true/false, 1/0, yes/no and on/off in any case.
pub fn parse_boolean(value: Option<&str>) -> Option<bool> {
    match normalize_string_to_undefined(value)?.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn require_string_with_message(
    value: Option<&str>,
    message: impl Into<String>,
) -> Result<String, MissingValue> {
    normalize_string_to_undefined(value).ok_or_else(|| MissingValue(message.into()))
}
