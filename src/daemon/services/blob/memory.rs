//! In-memory blob backend.
//!
//! Non-persistent store using `DashMap` for concurrent access. All data is
//! lost when the process exits.

use super::backend::BlobBackend;
use super::validation::validate_key;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory blob backend.
///
/// `Clone` shares the underlying map, so a test can keep a handle and
/// inspect what the service stored.
#[derive(Clone, Default)]
pub struct MemoryBlobBackend {
    data: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryBlobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of blobs in the store.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}

#[async_trait]
impl BlobBackend for MemoryBlobBackend {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        self.data.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = validate_key(key)?;
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        Ok(self.data.remove(key).is_some())
    }
}
