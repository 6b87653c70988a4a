//! Chunked upload assembly.
//!
//! Clients create a session, push byte ranges with an explicit offset, and
//! fetch the assembled file once every byte has arrived. Each chunk is first
//! written to a scratch blob, then folded into a single growing temp blob:
//!
//! ```text
//! chunks/{token}/chunk_{offset}.tmp   scratch, deleted after the merge
//! chunks/{token}/file{ext}            assembled file
//! ```
//!
//! All mutating operations hold a per-token lock for their whole
//! read-merge-write-persist sequence.

use serde::Serialize;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{UploadSession, UploadStatus};
use crate::services::blob_store::BlobStore;
use crate::services::session_store::SessionStore;
use crate::services::token_lock::TokenLocks;

const DEFAULT_CLEANUP_RETRY_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAX_UPLOAD_BYTES: i64 = 5 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct CreatedSession {
    pub upload_token: String,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct ChunkAck {
    pub upload_token: String,
    /// Bytes accepted so far; the next chunk starts here.
    pub offset: i64,
    pub progress: f64,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct SessionStatus {
    pub upload_token: String,
    pub filename: String,
    pub total_size: i64,
    pub uploaded_size: i64,
    pub chunk_count: i32,
    pub status: UploadStatus,
    pub progress: f64,
    pub completed: bool,
}

impl From<&UploadSession> for SessionStatus {
    fn from(session: &UploadSession) -> Self {
        Self {
            upload_token: session.upload_token().to_string(),
            filename: session.filename().to_string(),
            total_size: session.total_size(),
            uploaded_size: session.uploaded_size(),
            chunk_count: session.chunk_count(),
            status: session.status(),
            progress: session.progress_percent(),
            completed: session.is_complete(),
        }
    }
}

/// The assembled file, detached from the blob store.
#[derive(Debug)]
pub struct CompletedFile {
    pub filename: String,
    pub data: Cursor<Vec<u8>>,
}

impl CompletedFile {
    pub fn len(&self) -> usize {
        self.data.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.get_ref().is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_inner()
    }
}

/// Folds `chunk` into `existing` at `offset`.
///
/// * no existing file: the chunk, preceded by `offset` zero bytes
/// * `offset == 0`: the chunk replaces everything
/// * `offset == existing.len()`: the chunk is appended
/// * otherwise: `existing[..offset] + chunk`, dropping whatever followed
///   `offset`; an offset past the end appends without padding
pub fn merge_chunk(existing: Option<&[u8]>, chunk: &[u8], offset: usize) -> Vec<u8> {
    match existing {
        None => {
            let mut merged = vec![0u8; offset];
            merged.extend_from_slice(chunk);
            merged
        }
        Some(_) if offset == 0 => chunk.to_vec(),
        Some(existing) => {
            let keep = offset.min(existing.len());
            let mut merged = Vec::with_capacity(keep + chunk.len());
            merged.extend_from_slice(&existing[..keep]);
            merged.extend_from_slice(chunk);
            merged
        }
    }
}

pub fn scratch_prefix(upload_token: &str) -> String {
    format!("chunks/{}/", upload_token)
}

fn scratch_chunk_key(upload_token: &str, offset: u64) -> String {
    format!("chunks/{}/chunk_{}.tmp", upload_token, offset)
}

fn temp_file_key(upload_token: &str, filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    format!("chunks/{}/file{}", upload_token, ext)
}

fn to_size(value: u64, field: &str) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("{} is too large", field)))
}

pub struct ChunkAssembler {
    sessions: Arc<dyn SessionStore>,
    blobs: Arc<dyn BlobStore>,
    locks: TokenLocks,
    cleanup_retry_delay: Duration,
    max_upload_bytes: i64,
}

impl ChunkAssembler {
    pub fn new(sessions: Arc<dyn SessionStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            sessions,
            blobs,
            locks: TokenLocks::new(),
            cleanup_retry_delay: DEFAULT_CLEANUP_RETRY_DELAY,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_cleanup_retry_delay(mut self, delay: Duration) -> Self {
        self.cleanup_retry_delay = delay;
        self
    }

    /// Largest `total_size` a new session may declare.
    pub fn with_max_upload_bytes(mut self, max: u64) -> Self {
        self.max_upload_bytes = i64::try_from(max).unwrap_or(i64::MAX);
        self
    }

    pub async fn create_session(
        &self,
        filename: &str,
        total_size: i64,
    ) -> Result<CreatedSession, AppError> {
        if total_size > self.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "total_size must be <= {}, got {}",
                self.max_upload_bytes, total_size
            )));
        }

        let upload_token = Uuid::new_v4().to_string();
        let session = UploadSession::create(upload_token, filename, total_size)?;
        let session = self.sessions.save(session).await?;

        info!(
            upload_token = session.upload_token(),
            filename = session.filename(),
            total_size = session.total_size(),
            "upload session created"
        );

        Ok(CreatedSession {
            upload_token: session.upload_token().to_string(),
            offset: 0,
        })
    }

    pub async fn get_status(&self, upload_token: &str) -> Result<SessionStatus, AppError> {
        let session = self.load(upload_token).await?;
        Ok(SessionStatus::from(&session))
    }

    /// Appends one chunk and returns the new uploaded size.
    ///
    /// A chunk arriving after the session completed is dropped and the
    /// current size returned unchanged.
    pub async fn append_chunk(
        &self,
        upload_token: &str,
        chunk: &[u8],
        offset: u64,
        chunk_size: u64,
    ) -> Result<i64, AppError> {
        let _guard = self.locks.acquire(upload_token).await;
        let session = self.append_locked(upload_token, chunk, offset, chunk_size).await?;
        Ok(session.uploaded_size())
    }

    /// `append_chunk`, reporting progress the way clients consume it.
    pub async fn upload_chunk(
        &self,
        upload_token: &str,
        chunk: &[u8],
        offset: u64,
        chunk_size: u64,
    ) -> Result<ChunkAck, AppError> {
        let _guard = self.locks.acquire(upload_token).await;
        let session = self.append_locked(upload_token, chunk, offset, chunk_size).await?;
        Ok(ChunkAck {
            upload_token: upload_token.to_string(),
            offset: session.uploaded_size(),
            progress: session.progress_percent(),
            completed: session.is_complete(),
        })
    }

    async fn append_locked(
        &self,
        upload_token: &str,
        chunk: &[u8],
        offset: u64,
        chunk_size: u64,
    ) -> Result<UploadSession, AppError> {
        let mut session = self.load(upload_token).await?;

        if session.status().rejects_chunks() {
            return Err(AppError::InvalidState(format!(
                "Upload session has {}",
                session.status()
            )));
        }

        if session.status() == UploadStatus::Completed {
            debug!(upload_token, offset, "chunk after completion dropped");
            return Ok(session);
        }

        let chunk_len = to_size(chunk_size, "chunk_size")?;
        if to_size(offset, "offset")? > session.total_size() {
            return Err(AppError::Validation(format!(
                "offset {} is past the declared total_size {}",
                offset,
                session.total_size()
            )));
        }
        let merge_offset = usize::try_from(offset)
            .map_err(|_| AppError::Validation("offset is too large".to_string()))?;
        let uploaded_size = session
            .uploaded_size()
            .checked_add(chunk_len)
            .ok_or_else(|| {
                AppError::Validation("chunk_size overflows the uploaded size".to_string())
            })?;
        if chunk_size != chunk.len() as u64 {
            warn!(
                upload_token,
                declared = chunk_size,
                received = chunk.len(),
                "declared chunk size differs from received bytes"
            );
        }

        session.set_status(UploadStatus::Uploading);

        let temp_path = match session.temp_file_path() {
            Some(path) => path.to_string(),
            None => {
                let path = temp_file_key(upload_token, session.filename());
                session.set_temp_file_path(path.clone());
                path
            }
        };

        let scratch_key = scratch_chunk_key(upload_token, offset);
        self.blobs.save(&scratch_key, chunk.to_vec()).await?;

        let existing = if self.blobs.exists(&temp_path).await? {
            Some(self.blobs.read(&temp_path).await?)
        } else {
            None
        };
        let merged = merge_chunk(existing.as_deref(), chunk, merge_offset);
        let merged_len = merged.len();
        self.blobs.save(&temp_path, merged).await?;

        if let Err(e) = self.blobs.delete(&scratch_key).await {
            warn!(upload_token, key = %scratch_key, error = %e, "failed to delete scratch chunk");
        }

        session.update_uploaded_size(uploaded_size);
        session.increment_chunk_count();

        if session.uploaded_size() >= session.total_size() {
            session.set_status(UploadStatus::Completed);
        } else {
            session.set_status(UploadStatus::Uploading);
        }

        let session = self.sessions.save(session).await?;
        debug!(
            upload_token,
            offset,
            chunk_size,
            merged_len,
            uploaded_size = session.uploaded_size(),
            status = %session.status(),
            "chunk merged"
        );

        Ok(session)
    }

    /// Marks the session completed once every declared byte has arrived.
    /// Calling it again on a completed session changes nothing.
    pub async fn complete(&self, upload_token: &str) -> Result<UploadSession, AppError> {
        let _guard = self.locks.acquire(upload_token).await;
        self.complete_locked(upload_token).await
    }

    async fn complete_locked(&self, upload_token: &str) -> Result<UploadSession, AppError> {
        let mut session = self.load(upload_token).await?;
        if session.status().rejects_chunks() {
            return Err(AppError::InvalidState(format!(
                "Upload session has {}",
                session.status()
            )));
        }
        if session.status() == UploadStatus::Completed {
            return Ok(session);
        }
        session.complete()?;
        self.sessions.save(session).await
    }

    /// Reads the assembled file into memory.
    pub async fn get_completed_file(&self, upload_token: &str) -> Result<CompletedFile, AppError> {
        let session = self.load(upload_token).await?;

        if !session.is_complete() {
            return Err(AppError::Validation("Upload is not complete yet".to_string()));
        }

        let temp_path = session
            .temp_file_path()
            .ok_or_else(|| AppError::Validation("No file path available".to_string()))?;

        if !self.blobs.exists(temp_path).await? {
            return Err(AppError::Validation("Completed file not found".to_string()));
        }

        let data = self.blobs.read(temp_path).await?;
        Ok(CompletedFile {
            filename: session.filename().to_string(),
            data: Cursor::new(data),
        })
    }

    /// Completes the session, hands back the assembled bytes and removes
    /// every trace of the upload.
    ///
    /// Request errors leave the session untouched so the client can keep
    /// uploading; storage failures tear the session down.
    pub async fn complete_upload(&self, upload_token: &str) -> Result<CompletedFile, AppError> {
        let guard = self.locks.acquire(upload_token).await;

        let result = match self.complete_locked(upload_token).await {
            Ok(_) => self.get_completed_file(upload_token).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(file) => {
                self.cleanup_locked(upload_token).await?;
                drop(guard);
                info!(upload_token, size = file.len(), "upload completed");
                Ok(file)
            }
            Err(e) if e.is_domain() => Err(e),
            Err(e) => {
                warn!(upload_token, error = %e, "completion failed, cleaning up");
                if let Err(cleanup_err) = self.cleanup_locked(upload_token).await {
                    warn!(upload_token, error = %cleanup_err, "cleanup after failed completion failed");
                }
                Err(e)
            }
        }
    }

    pub async fn fail_upload(&self, upload_token: &str) -> Result<SessionStatus, AppError> {
        self.transition(upload_token, UploadStatus::Failed).await
    }

    pub async fn cancel_upload(&self, upload_token: &str) -> Result<SessionStatus, AppError> {
        self.transition(upload_token, UploadStatus::Cancelled).await
    }

    async fn transition(
        &self,
        upload_token: &str,
        status: UploadStatus,
    ) -> Result<SessionStatus, AppError> {
        let _guard = self.locks.acquire(upload_token).await;
        let mut session = self.load(upload_token).await?;

        if session.status() == UploadStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "Upload session is already completed and cannot be marked {}",
                status
            )));
        }

        if session.status() != status {
            session.set_status(status);
            session = self.sessions.save(session).await?;
            info!(upload_token, status = %status, "upload session status changed");
        }

        Ok(SessionStatus::from(&session))
    }

    /// Removes the session, its assembled file and any scratch chunks.
    /// Unknown tokens are ignored; blob deletion failures are logged and
    /// skipped.
    pub async fn cleanup_upload(&self, upload_token: &str) -> Result<(), AppError> {
        let _guard = self.locks.acquire(upload_token).await;
        self.cleanup_locked(upload_token).await
    }

    async fn cleanup_locked(&self, upload_token: &str) -> Result<(), AppError> {
        let Some(session) = self.sessions.get_by_token(upload_token).await? else {
            return Ok(());
        };

        if let Some(temp_path) = session.temp_file_path() {
            self.delete_with_retry(upload_token, temp_path).await;
        }

        let prefix = scratch_prefix(upload_token);
        match self.blobs.list(&prefix).await {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = self.blobs.delete(&key).await {
                        warn!(upload_token, key = %key, error = %e, "failed to delete scratch blob");
                    }
                }
            }
            Err(e) => warn!(upload_token, error = %e, "failed to list scratch blobs"),
        }

        if let Err(e) = self.blobs.prune(&prefix).await {
            warn!(upload_token, error = %e, "failed to prune scratch directory");
        }

        self.sessions.delete(&session).await?;
        info!(upload_token, "upload session cleaned up");
        Ok(())
    }

    async fn delete_with_retry(&self, upload_token: &str, key: &str) {
        match self.blobs.exists(key).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(upload_token, key, error = %e, "failed to check assembled file");
                return;
            }
        }

        if let Err(e) = self.blobs.delete(key).await {
            debug!(upload_token, key, error = %e, "assembled file delete failed, retrying");
            tokio::time::sleep(self.cleanup_retry_delay).await;
            if let Err(e) = self.blobs.delete(key).await {
                warn!(upload_token, key, error = %e, "failed to delete assembled file");
            }
        }
    }

    async fn load(&self, upload_token: &str) -> Result<UploadSession, AppError> {
        self.sessions
            .get_by_token(upload_token)
            .await?
            .ok_or_else(|| AppError::session_not_found(upload_token))
    }
}
