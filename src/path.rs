//! Path splitting and component validation.
//!
//! Mirrors the splitting done by `DirectoryManager.resolve_path` (split on
//! `/`, drop empty components) and the name rules in `utils.validators`.

use crate::error::FsError;

const MAX_NAME_LEN: usize = 32;
const RESERVED_NAMES: [&str; 6] = [".", "..", "CON", "PRN", "AUX", "NUL"];
const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '|', '?', '*', '\\', '/'];

/// Splits an absolute, `/`-separated path into its non-empty components,
/// validating each one. `"/"` and `""` both split to an empty component list
/// (the root).
pub fn split(path: &str) -> Result<Vec<&str>, FsError> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    for part in &parts {
        validate_name(part)?;
    }
    Ok(parts)
}

/// Validates a single path component (not a full path): length, forbidden
/// characters, control bytes, and reserved names.
pub fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() {
        return Err(FsError::InvalidName {
            name: name.to_string(),
            reason: "name must not be empty",
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::InvalidName {
            name: name.to_string(),
            reason: "name exceeds 32 bytes",
        });
    }
    if name.chars().any(|c| FORBIDDEN_CHARS.contains(&c) || c.is_control()) {
        return Err(FsError::InvalidName {
            name: name.to_string(),
            reason: "name contains a forbidden character",
        });
    }
    if RESERVED_NAMES.contains(&name.to_uppercase().as_str()) {
        return Err(FsError::InvalidName {
            name: name.to_string(),
            reason: "name is a reserved word",
        });
    }
    Ok(())
}

/// Splits `path` into `(parent_path, leaf_name)`, e.g. `"/a/b/c"` ->
/// `("/a/b", "c")`, `"/c"` -> `("/", "c")`.
pub fn split_parent(path: &str) -> Result<(String, String), FsError> {
    let parts = split(path)?;
    let leaf = parts
        .last()
        .ok_or_else(|| FsError::InvalidName {
            name: path.to_string(),
            reason: "path has no leaf component",
        })?
        .to_string();
    let parent = if parts.len() <= 1 {
        "/".to_string()
    } else {
        format!("/{}", parts[..parts.len() - 1].join("/"))
    };
    Ok((parent, leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_splits_to_empty() {
        assert_eq!(split("/").unwrap(), Vec::<&str>::new());
        assert_eq!(split("").unwrap(), Vec::<&str>::new());
    }

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(split("/a//b///c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn rejects_reserved_and_forbidden_names() {
        assert!(validate_name("CON").is_err());
        assert!(validate_name("con").is_err());
        assert!(validate_name("a*b").is_err());
        assert!(validate_name(&"x".repeat(33)).is_err());
        assert!(validate_name("normal.txt").is_ok());
    }

    #[test]
    fn split_parent_handles_top_level_and_nested() {
        assert_eq!(split_parent("/a.txt").unwrap(), ("/".to_string(), "a.txt".to_string()));
        assert_eq!(
            split_parent("/d/e/f.txt").unwrap(),
            ("/d/e".to_string(), "f.txt".to_string())
        );
    }
}
