//! Named byte-blob storage used for scratch chunks and assembled files.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::AppError;

/// Storage backend for upload blobs.
///
/// Keys are `/`-separated strings such as `chunks/{token}/file.mp4`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Reads the whole blob. Fails if the key is absent.
    async fn read(&self, key: &str) -> Result<Vec<u8>, AppError>;

    /// Creates or overwrites `key`, returning the key it was stored under.
    async fn save(&self, key: &str, data: Vec<u8>) -> Result<String, AppError>;

    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), AppError>;

    /// Lists every key starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, AppError>;

    /// Drops any container left behind for `prefix` once its blobs are gone.
    /// Flat key spaces have nothing to do here.
    async fn prune(&self, _prefix: &str) -> Result<(), AppError> {
        Ok(())
    }
}

/// Process-local blob store, used by tests and single-node development runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.blobs.read().await.clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, AppError> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::Storage(format!("blob {} does not exist", key)))
    }

    async fn save(&self, key: &str, data: Vec<u8>) -> Result<String, AppError> {
        self.blobs.write().await.insert(key.to_string(), data);
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        Ok(self
            .blobs
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
