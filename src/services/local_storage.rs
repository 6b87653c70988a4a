use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::services::blob_store::BlobStore;

/// Filesystem blob store. Key `a/b/c.bin` lives at `{root}/a/b/c.bin`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, key: &str) -> Result<PathBuf, AppError> {
        let relative = Path::new(key.trim_end_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(AppError::Validation(format!("invalid blob key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let path = self.full_path(key)?;
        Ok(fs::try_exists(&path).await? && fs::metadata(&path).await?.is_file())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.full_path(key)?;
        fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::Storage(format!("blob {} does not exist", key)),
            _ => AppError::Io(e),
        })
    }

    async fn save(&self, key: &str, data: Vec<u8>) -> Result<String, AppError> {
        let path = self.full_path(key)?;
        debug!(key, full_path = %path.display(), size = data.len(), "local_storage: save");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to a sibling and rename so readers never see a half-written blob.
        let mut staging = path.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);

        let mut file = fs::File::create(&staging).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&staging, &path).await.map_err(|e| {
            warn!(from = %staging.display(), to = %path.display(), error = %e, "local_storage: rename failed");
            e
        })?;

        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.full_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        // Prefixes name directories; "chunks/{token}/" lists that directory tree.
        let dir = self.full_path(prefix)?;
        let mut keys = Vec::new();
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) if e.kind() == ErrorKind::NotADirectory => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.key_for(&path) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn prune(&self, prefix: &str) -> Result<(), AppError> {
        let dir = self.full_path(prefix)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_read_list_and_prune() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        store.save("chunks/t1/chunk_0.tmp", b"abc".to_vec()).await.unwrap();
        store.save("chunks/t1/file.mp4", b"xyz".to_vec()).await.unwrap();
        store.save("chunks/t2/file.mp4", b"other".to_vec()).await.unwrap();

        assert!(store.exists("chunks/t1/file.mp4").await.unwrap());
        assert!(!store.exists("chunks/t1").await.unwrap());
        assert_eq!(store.read("chunks/t1/chunk_0.tmp").await.unwrap(), b"abc");
        assert_eq!(
            store.list("chunks/t1/").await.unwrap(),
            vec!["chunks/t1/chunk_0.tmp", "chunks/t1/file.mp4"]
        );

        store.prune("chunks/t1/").await.unwrap();
        assert!(store.list("chunks/t1/").await.unwrap().is_empty());
        assert!(store.exists("chunks/t2/file.mp4").await.unwrap());
    }

    #[tokio::test]
    async fn missing_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        assert!(!store.exists("nope/file.bin").await.unwrap());
        assert!(matches!(store.read("nope/file.bin").await, Err(AppError::Storage(_))));
        store.delete("nope/file.bin").await.unwrap();
        assert!(store.list("nope/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let err = store.save("../outside.bin", vec![1]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(matches!(store.read("/etc/passwd").await, Err(AppError::Validation(_))));
    }
}
