//! Key validation for blob backends.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

/// Validates a blob key.
///
/// Keys are generated internally, but the filesystem backend joins them onto
/// its base directory, so anything that could name another location is
/// rejected: empty keys, `.`/`..`, separators and control characters.
pub(crate) fn validate_key(key: &str) -> Result<&str> {
    if key.is_empty() {
        bail!("Blob key cannot be empty");
    }
    if key == "." || key == ".." {
        bail!("Blob key cannot be a relative directory: {key}");
    }
    if key.contains(['/', '\\']) {
        bail!("Blob key cannot contain path separators: {key}");
    }
    if key.chars().any(char::is_control) {
        bail!("Blob key cannot contain control characters");
    }
    Ok(key)
}

/// Returns the filesystem path for a blob under `base_dir`.
pub(crate) fn blob_path(base_dir: &Path, key: &str) -> Result<PathBuf> {
    Ok(base_dir.join(validate_key(key)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(validate_key("0b6c2f4e-9d7a-4c1e-8f3b-2a5d6e7f8091").is_ok());
        assert!(validate_key("report.pdf").is_ok());
    }

    #[test]
    fn test_rejected_keys() {
        for key in ["", ".", "..", "../etc/passwd", "a/b", "a\\b", "/abs", "nul\0byte"] {
            assert!(validate_key(key).is_err(), "key accepted: {key:?}");
        }
    }

    #[test]
    fn test_blob_path_stays_in_base() {
        let base = Path::new("/srv/files");
        let path = blob_path(base, "abc").unwrap();
        assert_eq!(path, base.join("abc"));
        assert!(blob_path(base, "../abc").is_err());
    }
}
