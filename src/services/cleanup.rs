use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::services::chunk_assembler::ChunkAssembler;
use crate::services::session_store::SessionStore;

/// Garbage-collects upload sessions nobody has touched for a while.
pub struct CleanupService {
    assembler: Arc<ChunkAssembler>,
    sessions: Arc<dyn SessionStore>,
    stale_after: chrono::Duration,
    interval: Duration,
}

impl CleanupService {
    pub fn new(
        assembler: Arc<ChunkAssembler>,
        sessions: Arc<dyn SessionStore>,
        stale_after: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            assembler,
            sessions,
            stale_after,
            interval,
        }
    }

    pub async fn run_scheduler(self) {
        info!(interval_secs = self.interval.as_secs(), "cleanup scheduler started");
        let mut interval = tokio::time::interval(self.interval);

        loop {
            interval.tick().await;

            match self.sweep_once().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "cleanup scheduler removed stale uploads"),
                Err(e) => error!(error = %e, "cleanup scheduler failed"),
            }
        }
    }

    /// Cleans up every session idle for longer than `stale_after`.
    pub async fn sweep_once(&self) -> Result<usize, AppError> {
        let threshold = Utc::now()
            .naive_utc()
            .checked_sub_signed(self.stale_after)
            .ok_or_else(|| AppError::Config("stale session threshold is out of range".to_string()))?;
        let stale = self.sessions.list_stale(threshold).await?;

        if stale.is_empty() {
            return Ok(0);
        }

        info!(count = stale.len(), "found stale upload sessions");

        let mut removed = 0;
        for session in stale {
            match self.assembler.cleanup_upload(session.upload_token()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    upload_token = session.upload_token(),
                    status = %session.status(),
                    error = %e,
                    "failed to clean up stale upload"
                ),
            }
        }

        Ok(removed)
    }
}
