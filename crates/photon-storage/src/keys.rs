//! Shared key normalization for storage backends.
//!
//! Keys are `/`-separated, never start or end with `/`, and never contain `.`
//! or `..` segments once they have passed `validate_key`.

use crate::traits::{StorageError, StorageResult};

/// Normalize a storage path: backslashes become `/`, whitespace and
/// leading/trailing slashes are trimmed. Blank input yields `None`.
pub fn normalize_path(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    let replaced = value.replace('\\', "/");
    let segments: Vec<&str> = replaced.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Normalize a key, mapping blank input to the empty string.
pub fn normalize_key(key: &str) -> String {
    normalize_path(Some(key)).unwrap_or_default()
}

/// Join path segments with `/`, skipping segments that normalize to nothing.
pub fn join_segments<'a, I>(segments: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    segments
        .into_iter()
        .filter_map(|segment| normalize_path(Some(segment)))
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a key and reject relative segments that could escape a prefix.
pub fn validate_key(key: &str) -> StorageResult<String> {
    let normalized = normalize_key(key);
    if normalized
        .split('/')
        .any(|segment| segment == ".." || segment == ".")
    {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains relative segments: {}",
            key
        )));
    }
    Ok(normalized)
}

/// Remove `prefix/` from the front of `key`. Returns the key unchanged when it
/// does not live under `prefix`, and the empty string when it equals `prefix`.
pub fn strip_prefix(prefix: &str, key: &str) -> String {
    let normalized = normalize_key(key);
    if prefix.is_empty() {
        return normalized;
    }
    if normalized == prefix {
        return String::new();
    }
    match normalized.strip_prefix(prefix) {
        Some(rest) if rest.starts_with('/') => rest[1..].to_string(),
        _ => normalized,
    }
}

/// Lowercased extension of the last path segment, if any.
pub fn extension(key: &str) -> Option<String> {
    let file_name = key.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_slashes_and_backslashes() {
        assert_eq!(normalize_path(Some("/a/b/")), Some("a/b".to_string()));
        assert_eq!(normalize_path(Some("a\\b\\c")), Some("a/b/c".to_string()));
        assert_eq!(normalize_path(Some("a//b")), Some("a/b".to_string()));
        assert_eq!(normalize_path(Some(" / ")), None);
        assert_eq!(normalize_path(Some("")), None);
        assert_eq!(normalize_path(None), None);
    }

    #[test]
    fn join_skips_empty_segments() {
        assert_eq!(join_segments(["root", "", "acme"]), "root/acme");
        assert_eq!(join_segments(["/root/", "/tenants/", "acme/"]), "root/tenants/acme");
        assert_eq!(join_segments(["", ""]), "");
    }

    #[test]
    fn validate_rejects_relative_segments() {
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("./a").is_err());
        assert!(validate_key("..").is_err());
        assert_eq!(validate_key("/photos/a..b.jpg").unwrap(), "photos/a..b.jpg");
    }

    #[test]
    fn strip_only_removes_whole_segments() {
        assert_eq!(strip_prefix("root/acme", "root/acme/a.jpg"), "a.jpg");
        assert_eq!(strip_prefix("root/acme", "root/acme"), "");
        assert_eq!(strip_prefix("root/acme", "root/acme2/a.jpg"), "root/acme2/a.jpg");
        assert_eq!(strip_prefix("", "/a.jpg"), "a.jpg");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension("a/IMG_0001.HEIC"), Some("heic".to_string()));
        assert_eq!(extension("a.b/noext"), None);
        assert_eq!(extension(".hidden"), None);
    }
}
