//! Validation functions for configuration values.
//!
//! Repository names, owners and hosters become path components of the backup
//! layout, so they must be plain file names.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::Path;

pub fn validate_path_component<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() {
        return Err(ValidationError::new("InvalidPathComponent")
            .with_message("must not be empty".into()));
    }

    if name == "." || name == ".." || !is_sanitized(name) {
        return Err(ValidationError::new("InvalidPathComponent").with_message(
            format!(
                "Invalid path component {:?}, try sanitizing like {:?}",
                name,
                sanitize(name)
            )
            .into(),
        ));
    }

    Ok(())
}

pub fn validate_optional_path_component<S: AsRef<str>>(name: S) -> Result<(), ValidationError> {
    if name.as_ref().is_empty() {
        return Ok(());
    }
    validate_path_component(name)
}

pub fn validate_not_a_file<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.as_os_str().is_empty() {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message("destination path must not be empty".into()));
    }

    if dir.exists() && !dir.is_dir() {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} is not a directory", dir).into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_names_are_valid() {
        assert!(validate_path_component("k-backup").is_ok());
        assert!(validate_path_component("github.com").is_ok());
    }

    #[test]
    fn test_traversal_is_rejected() {
        assert!(validate_path_component("..").is_err());
        assert!(validate_path_component("a/b").is_err());
        assert!(validate_path_component("").is_err());
    }

    #[test]
    fn test_optional_component_allows_empty() {
        assert!(validate_optional_path_component("").is_ok());
        assert!(validate_optional_path_component("x/y").is_err());
    }

    #[test]
    fn test_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("file");
        std::fs::write(&file_path, "x").unwrap();

        assert!(validate_not_a_file(temp_dir.path()).is_ok());
        assert!(validate_not_a_file(temp_dir.path().join("missing")).is_ok());
        assert!(validate_not_a_file(&file_path).is_err());
        assert!(validate_not_a_file("").is_err());
    }
}
