//! Validation and resolution of client-supplied paths under the content root.

use std::path::{Path, PathBuf};

const MAX_RELATIVE_PATH_LEN: usize = 1024;

/// Public URL prefix under which the content root is served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

/// Normalize a client reference to an image or folder into a `/`-separated
/// path relative to the content root.
///
/// Accepts bare ids (`family/a.jpg`) as well as the served form
/// (`/uploads/family/a.jpg` or `uploads/family/a.jpg`).
pub fn normalize_reference(reference: &str) -> &str {
    let trimmed = reference.trim();
    let without_prefix = trimmed
        .strip_prefix(UPLOADS_URL_PREFIX)
        .or_else(|| trimmed.strip_prefix(&UPLOADS_URL_PREFIX[1..]))
        .unwrap_or(trimmed);
    without_prefix.trim_matches('/')
}

/// Reject paths that could escape the content root or name odd files.
///
/// An empty path is allowed here (it names the root itself); callers that
/// need a file check for emptiness themselves.
pub fn is_safe_relative(path: &str) -> bool {
    if path.len() > MAX_RELATIVE_PATH_LEN || path.starts_with('/') {
        return false;
    }
    if path
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return false;
    }
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .all(|segment| segment != ".." && segment != ".")
}

/// A single folder or file name: non-empty, no separators, not hidden.
pub fn is_safe_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.starts_with('.') && is_safe_relative(name)
}

/// Join a validated relative path onto `root`.
pub fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    if !is_safe_relative(relative) {
        return None;
    }
    let mut path = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    Some(path)
}

/// Percent-encode a path component for use in a URL (like
/// `encodeURIComponent`: unreserved characters pass through).
pub fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*'
            | b'\'' | b'(' | b')' => encoded.push(byte as char),
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

/// Percent-encode a `/`-separated path, keeping the separators.
pub fn encode_path(value: &str) -> String {
    value
        .split('/')
        .map(encode_component)
        .collect::<Vec<_>>()
        .join("/")
}
