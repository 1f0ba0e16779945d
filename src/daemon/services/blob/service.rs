//! High-level `BlobStore` wrapper over backend implementations.

use super::backend::BlobBackend;
use super::filesystem::FilesystemBlobBackend;
use super::memory::MemoryBlobBackend;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Blob store handle used by the lifecycle manager.
///
/// `Clone` and shareable across tasks; the backend handles concurrency.
#[derive(Clone)]
pub struct BlobStore {
    backend: Arc<dyn BlobBackend>,
}

impl BlobStore {
    /// Creates a store backed by a filesystem directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or opened.
    pub fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::custom(FilesystemBlobBackend::open(path)?))
    }

    /// Creates a store backed by memory. All data is lost on exit.
    pub fn memory() -> Self {
        Self::custom(MemoryBlobBackend::new())
    }

    /// Creates a store with a custom backend.
    pub fn custom<B: BlobBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.backend.put(key, data).await
    }

    /// Returns `Ok(None)` if the blob doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the read fails.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.get(key).await
    }

    /// Returns `Ok(true)` if the blob existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or removal fails.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        self.backend.remove(key).await
    }
}
