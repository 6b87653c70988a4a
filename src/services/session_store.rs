//! Persistence for upload sessions.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::entities::upload_session;
use crate::error::AppError;
use crate::models::UploadSession;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates or updates the session, keyed by its id.
    async fn save(&self, session: UploadSession) -> Result<UploadSession, AppError>;

    async fn get_by_token(&self, upload_token: &str) -> Result<Option<UploadSession>, AppError>;

    async fn delete(&self, session: &UploadSession) -> Result<(), AppError>;

    /// Sessions not touched since `before`, oldest first.
    async fn list_stale(&self, before: NaiveDateTime) -> Result<Vec<UploadSession>, AppError>;
}

#[derive(Clone)]
pub struct DbSessionStore {
    db: DatabaseConnection,
}

impl DbSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn save(&self, session: UploadSession) -> Result<UploadSession, AppError> {
        let active = upload_session::ActiveModel::from(&session);

        upload_session::Entity::insert(active)
            .on_conflict(
                OnConflict::column(upload_session::Column::Id)
                    .update_columns([
                        upload_session::Column::Filename,
                        upload_session::Column::TotalSize,
                        upload_session::Column::UploadedSize,
                        upload_session::Column::ChunkCount,
                        upload_session::Column::TempFilePath,
                        upload_session::Column::Status,
                        upload_session::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(session)
    }

    async fn get_by_token(&self, upload_token: &str) -> Result<Option<UploadSession>, AppError> {
        upload_session::Entity::find()
            .filter(upload_session::Column::UploadToken.eq(upload_token))
            .one(&self.db)
            .await?
            .map(UploadSession::try_from)
            .transpose()
    }

    async fn delete(&self, session: &UploadSession) -> Result<(), AppError> {
        upload_session::Entity::delete_by_id(session.id())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_stale(&self, before: NaiveDateTime) -> Result<Vec<UploadSession>, AppError> {
        upload_session::Entity::find()
            .filter(upload_session::Column::UpdatedAt.lt(before))
            .order_by_asc(upload_session::Column::UpdatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(UploadSession::try_from)
            .collect()
    }
}

/// In-memory session store keyed by upload token.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, UploadSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session: UploadSession) -> Result<UploadSession, AppError> {
        let mut sessions = self.sessions.write().await;
        let token_taken = sessions
            .get(session.upload_token())
            .is_some_and(|existing| existing.id() != session.id());
        if token_taken {
            return Err(AppError::InternalServerError(format!(
                "upload token {} is already in use",
                session.upload_token()
            )));
        }
        sessions.insert(session.upload_token().to_string(), session.clone());
        Ok(session)
    }

    async fn get_by_token(&self, upload_token: &str) -> Result<Option<UploadSession>, AppError> {
        Ok(self.sessions.read().await.get(upload_token).cloned())
    }

    async fn delete(&self, session: &UploadSession) -> Result<(), AppError> {
        self.sessions.write().await.remove(session.upload_token());
        Ok(())
    }

    async fn list_stale(&self, before: NaiveDateTime) -> Result<Vec<UploadSession>, AppError> {
        let mut stale: Vec<UploadSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.updated_at() < before)
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.updated_at());
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_rejects_token_reuse() {
        let store = MemorySessionStore::new();
        store
            .save(UploadSession::create("tok", "a.bin", 1).unwrap())
            .await
            .unwrap();

        let clash = UploadSession::create("tok", "b.bin", 1).unwrap();
        assert!(store.save(clash).await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn memory_store_lists_stale_sessions_oldest_first() {
        let store = MemorySessionStore::new();
        let mut old = UploadSession::create("old", "a.bin", 1).unwrap();
        old.updated_at -= chrono::Duration::hours(48);
        let mut older = UploadSession::create("older", "a.bin", 1).unwrap();
        older.updated_at -= chrono::Duration::hours(72);
        let fresh = UploadSession::create("fresh", "a.bin", 1).unwrap();

        for s in [old, older, fresh] {
            store.save(s).await.unwrap();
        }

        let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::hours(24);
        let stale = store.list_stale(cutoff).await.unwrap();
        let tokens: Vec<_> = stale.iter().map(|s| s.upload_token()).collect();
        assert_eq!(tokens, vec!["older", "old"]);
    }
}
