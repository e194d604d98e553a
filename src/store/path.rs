//! Store path parsing.
//!
//! Paths are `/`-separated segments.  Leading and trailing slashes are
//! ignored and the empty path addresses the root of the tree.

use super::StoreError;

/// Characters a path segment may never contain.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']'];

/// Normalize a path: drop surrounding slashes and validate every segment.
pub fn normalize(path: &str) -> Result<String, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for segment in trimmed.split('/') {
        validate_segment(segment, path)?;
    }
    Ok(trimmed.to_string())
}

/// Split a normalized path into segments.  The root yields no segments.
pub fn segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

/// Join a normalized base path with a relative child path.
pub fn join(base: &str, child: &str) -> String {
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{child}"),
    }
}

/// Whether `ancestor` equals `path` or contains it.
pub fn contains(ancestor: &str, path: &str) -> bool {
    ancestor.is_empty()
        || path == ancestor
        || (path.len() > ancestor.len()
            && path.starts_with(ancestor)
            && path.as_bytes()[ancestor.len()] == b'/')
}

/// Whether a write at one path can change what is visible at the other.
pub fn related(a: &str, b: &str) -> bool {
    contains(a, b) || contains(b, a)
}

/// Whether `key` is usable as a single path segment.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && !key.contains('/') && !key.contains(FORBIDDEN)
}

fn validate_segment(segment: &str, full: &str) -> Result<(), StoreError> {
    if segment.is_empty() {
        return Err(StoreError::InvalidPath(format!(
            "empty segment in '{full}'"
        )));
    }
    if segment.contains(FORBIDDEN) {
        return Err(StoreError::InvalidPath(format!(
            "segment '{segment}' in '{full}' contains a reserved character"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_validates() {
        assert_eq!(normalize("/users/u1/").unwrap(), "users/u1");
        assert_eq!(normalize("").unwrap(), "");
        assert_eq!(normalize("///").unwrap(), "");
        assert!(normalize("users//u1").is_err());
        assert!(normalize("users/u.1").is_err());
        assert!(normalize("posts/[0]").is_err());
    }

    #[test]
    fn containment_is_segment_aware() {
        assert!(contains("users", "users/u1"));
        assert!(contains("users/u1", "users/u1"));
        assert!(!contains("users/u1", "users/u10"));
        assert!(contains("", "anything/at/all"));
        assert!(related("users/u1/unread", "users"));
        assert!(!related("users/u1", "social/u1"));
    }

    #[test]
    fn join_handles_root() {
        assert_eq!(join("", "a/b"), "a/b");
        assert_eq!(join("a", ""), "a");
        assert_eq!(join("a", "b"), "a/b");
    }
}
