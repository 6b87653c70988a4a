pub mod blob_store;
pub mod chunk_assembler;
pub mod cleanup;
pub mod local_storage;
pub mod s3;
pub mod session_store;
pub mod token_lock;

use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::error::AppError;
use blob_store::BlobStore;
use local_storage::LocalBlobStore;
use s3::S3BlobStore;

pub async fn build_blob_store(config: &Config) -> Result<Arc<dyn BlobStore>, AppError> {
    match config.storage_backend {
        StorageBackend::Local => {
            tokio::fs::create_dir_all(&config.local_storage_root).await?;
            Ok(Arc::new(LocalBlobStore::new(&config.local_storage_root)))
        }
        StorageBackend::S3 => {
            let settings = config.s3.as_ref().ok_or_else(|| {
                AppError::Config("S3 settings are required for the s3 backend".to_string())
            })?;
            let store = S3BlobStore::new(settings);
            store.ensure_bucket_exists().await?;
            Ok(Arc::new(store))
        }
    }
}
