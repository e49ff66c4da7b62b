use crate::PolicyError;
use std::ffi::{CStr, CString};

pub const OS_PATH_SEPARATOR: u8 = b'/';

// A path is sane if it is absolute, has no null byte, and has no "." or ".."
// or empty component. A single trailing separator is tolerated.
pub fn path_is_sane(path: &[u8]) -> bool {
    if path.first() != Some(&OS_PATH_SEPARATOR) || path.contains(&0) {
        return false;
    }
    let inner = path.strip_suffix(&[OS_PATH_SEPARATOR]).unwrap_or(path);
    if inner.is_empty() {
        return true; // "/"
    }
    inner[1..]
        .split(|b| *b == OS_PATH_SEPARATOR)
        .all(|component| !matches!(component, b"" | b"." | b".."))
}

// Patterns ending with a separator match the directory itself and anything
// beneath it. Anything else only matches byte-for-byte.
pub(crate) fn pattern_matches(pattern: &CStr, path: &[u8]) -> bool {
    let pattern = pattern.to_bytes();
    match pattern.strip_suffix(&[OS_PATH_SEPARATOR]) {
        Some(dir) => {
            // Prefix matches are only safe on paths without ".." components,
            // otherwise "/allowed/../etc/shadow" would match "/allowed/"
            path_is_sane(path) && (path == dir || path.starts_with(pattern))
        }
        None => path == pattern,
    }
}

pub(crate) fn parse_pattern(path: &str) -> Result<CString, PolicyError> {
    let pattern = CString::new(path)?;
    if path.as_bytes().first() != Some(&OS_PATH_SEPARATOR) {
        return Err(PolicyError::UnsupportedFilesystemPath {
            path: path.to_owned(),
        });
    }
    if !path_is_sane(path.as_bytes()) {
        return Err(PolicyError::PathNotInCanonicalForm {
            path: path.to_owned(),
        });
    }
    Ok(pattern)
}
