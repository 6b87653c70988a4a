//! Chunked upload session and its status lifecycle.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl UploadStatus {
    pub const ALL: [UploadStatus; 5] = [
        UploadStatus::Pending,
        UploadStatus::Uploading,
        UploadStatus::Completed,
        UploadStatus::Failed,
        UploadStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
            UploadStatus::Cancelled => "cancelled",
        }
    }

    /// Sessions in these states accept no more chunks.
    pub fn rejects_chunks(&self) -> bool {
        matches!(self, UploadStatus::Failed | UploadStatus::Cancelled)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        UploadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| {
                let valid = UploadStatus::ALL
                    .iter()
                    .map(UploadStatus::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                AppError::Validation(format!(
                    "Status '{}' is not valid. Valid statuses are: {}",
                    value, valid
                ))
            })
    }
}

/// One chunked-upload transaction.
///
/// The session only tracks byte accounting and status; the assembled bytes
/// live in the blob store under `temp_file_path`.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadSession {
    pub(crate) id: Uuid,
    pub(crate) upload_token: String,
    pub(crate) filename: String,
    pub(crate) total_size: i64,
    pub(crate) uploaded_size: i64,
    pub(crate) chunk_count: i32,
    pub(crate) temp_file_path: Option<String>,
    pub(crate) status: UploadStatus,
    pub(crate) created_at: NaiveDateTime,
    pub(crate) updated_at: NaiveDateTime,
}

impl UploadSession {
    pub fn create(
        upload_token: impl Into<String>,
        filename: impl Into<String>,
        total_size: i64,
    ) -> Result<Self, AppError> {
        let upload_token = upload_token.into();
        let filename = filename.into();

        if upload_token.trim().is_empty() {
            return Err(AppError::Validation("upload_token is required".to_string()));
        }
        if filename.trim().is_empty() {
            return Err(AppError::Validation("filename is required".to_string()));
        }
        if total_size < 0 {
            return Err(AppError::Validation(format!(
                "total_size must be >= 0, got {}",
                total_size
            )));
        }

        let now = chrono::Utc::now().naive_utc();
        Ok(Self {
            id: Uuid::new_v4(),
            upload_token,
            filename,
            total_size,
            uploaded_size: 0,
            chunk_count: 0,
            temp_file_path: None,
            status: UploadStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn upload_token(&self) -> &str {
        &self.upload_token
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn total_size(&self) -> i64 {
        self.total_size
    }

    pub fn uploaded_size(&self) -> i64 {
        self.uploaded_size
    }

    pub fn chunk_count(&self) -> i32 {
        self.chunk_count
    }

    pub fn temp_file_path(&self) -> Option<&str> {
        self.temp_file_path.as_deref()
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }

    /// Reaching the byte count is not enough; the status must also have
    /// moved to `completed`.
    pub fn is_complete(&self) -> bool {
        self.uploaded_size >= self.total_size && self.status == UploadStatus::Completed
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        let percent = self.uploaded_size as f64 / self.total_size as f64 * 100.0;
        percent.clamp(0.0, 100.0)
    }

    pub fn update_uploaded_size(&mut self, size: i64) {
        self.uploaded_size = size;
        self.touch();
    }

    pub fn increment_chunk_count(&mut self) {
        self.chunk_count += 1;
        self.touch();
    }

    pub fn set_status(&mut self, status: UploadStatus) {
        self.status = status;
        self.touch();
    }

    pub fn set_temp_file_path(&mut self, path: impl Into<String>) {
        self.temp_file_path = Some(path.into());
        self.touch();
    }

    pub fn complete(&mut self) -> Result<(), AppError> {
        if self.uploaded_size < self.total_size {
            return Err(AppError::InvalidState(format!(
                "Upload is not completed yet. {}/{} bytes uploaded",
                self.uploaded_size, self.total_size
            )));
        }

        if self.status == UploadStatus::Completed {
            return Ok(());
        }

        self.set_status(UploadStatus::Completed);
        Ok(())
    }

    fn touch(&mut self) {
        let now = chrono::Utc::now().naive_utc();
        // Keep updated_at monotonic even if the wall clock steps back.
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

impl fmt::Display for UploadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadSession {} - {}", self.upload_token, self.filename)
    }
}
