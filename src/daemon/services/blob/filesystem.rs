//! Filesystem-backed blob backend.
//!
//! One file per blob, named by its key, directly under the base directory.
//! Writes go to a temporary sibling first and are renamed into place so a
//! reader never observes a partially written blob.

use super::backend::BlobBackend;
use super::validation::blob_path;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const TEMP_SUFFIX: &str = ".partial";

/// Filesystem-backed blob backend.
///
/// `Clone` is cheap; clones share the same base directory.
#[derive(Clone)]
pub struct FilesystemBlobBackend {
    base_dir: Arc<PathBuf>,
}

impl FilesystemBlobBackend {
    /// Creates the base directory if needed and removes leftovers from
    /// interrupted writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or scanned.
    pub fn open<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();

        fs::create_dir_all(&base_dir).with_context(|| {
            format!("Failed to create blob directory: {}", base_dir.display())
        })?;

        let entries = fs::read_dir(&base_dir)
            .with_context(|| format!("Failed to scan blob directory: {}", base_dir.display()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TEMP_SUFFIX))
            {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial blob");
                }
            }
        }

        Ok(Self {
            base_dir: Arc::new(base_dir),
        })
    }

    fn put_sync(&self, key: &str, data: &[u8]) -> Result<()> {
        let final_path = blob_path(&self.base_dir, key)?;
        let temp_path = self.base_dir.join(format!("{key}{TEMP_SUFFIX}"));

        fs::write(&temp_path, data).with_context(|| format!("Failed to write blob: {key}"))?;
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e).with_context(|| format!("Failed to commit blob: {key}"));
        }
        Ok(())
    }

    fn get_sync(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = blob_path(&self.base_dir, key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read blob: {key}")),
        }
    }

    fn remove_sync(&self, key: &str) -> Result<bool> {
        let path = blob_path(&self.base_dir, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove blob: {key}")),
        }
    }
}

#[async_trait]
impl BlobBackend for FilesystemBlobBackend {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let backend = self.clone();
        let key = key.to_string();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || backend.put_sync(&key, &data))
            .await
            .context("Task join error")?
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.get_sync(&key))
            .await
            .context("Task join error")?
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.remove_sync(&key))
            .await
            .context("Task join error")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_backend() -> (FilesystemBlobBackend, TempDir) {
        let tmp = TempDir::new().unwrap();
        let backend = FilesystemBlobBackend::open(tmp.path()).unwrap();
        (backend, tmp)
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let (backend, tmp) = create_backend();

        backend.put("k1", b"hello").await.unwrap();
        assert!(tmp.path().join("k1").is_file());
        assert_eq!(backend.get("k1").await.unwrap().unwrap(), b"hello");

        assert!(backend.remove("k1").await.unwrap());
        assert!(backend.get("k1").await.unwrap().is_none());
        assert!(!backend.remove("k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_partial_file_left_behind() {
        let (backend, tmp) = create_backend();
        backend.put("k2", b"data").await.unwrap();

        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["k2".to_string()]);
    }

    #[tokio::test]
    async fn test_open_cleans_partial_writes() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(format!("k3{TEMP_SUFFIX}")), b"half").unwrap();
        fs::write(tmp.path().join("k4"), b"whole").unwrap();

        let backend = FilesystemBlobBackend::open(tmp.path()).unwrap();
        assert!(!tmp.path().join(format!("k3{TEMP_SUFFIX}")).exists());
        assert_eq!(backend.get("k4").await.unwrap().unwrap(), b"whole");
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let (backend, _tmp) = create_backend();
        assert!(backend.put("../escape", b"x").await.is_err());
        assert!(backend.get("a/b").await.is_err());
        assert!(backend.remove("").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_blob() {
        let (backend, _tmp) = create_backend();
        backend.put("empty", b"").await.unwrap();
        assert_eq!(backend.get("empty").await.unwrap().unwrap(), Vec::<u8>::new());
    }
}
