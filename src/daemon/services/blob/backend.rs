//! Backend trait for the blob store.

use anyhow::Result;
use async_trait::async_trait;

/// Backend trait for blob storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Keys are validated by the backend; a key is a single path-safe segment.
#[async_trait]
pub trait BlobBackend: Send + Sync + 'static {
    /// Stores a blob, replacing any previous content under the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Retrieves a blob.
    ///
    /// # Returns
    /// * `Ok(Some(data))` - Blob found
    /// * `Ok(None)` - Blob not found
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the read fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removes a blob.
    ///
    /// # Returns
    /// * `Ok(true)` - Blob existed and was removed
    /// * `Ok(false)` - Blob did not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or removal fails.
    async fn remove(&self, key: &str) -> Result<bool>;
}
