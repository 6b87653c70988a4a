use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{UploadSession, UploadStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "upload_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub upload_token: String,
    pub filename: String,
    pub total_size: i64,
    pub uploaded_size: i64,
    pub chunk_count: i32,
    pub temp_file_path: Option<String>,
    pub status: String, // pending, uploading, completed, failed, cancelled
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for UploadSession {
    type Error = AppError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let status = model.status.parse::<UploadStatus>()?;
        Ok(UploadSession {
            id: model.id,
            upload_token: model.upload_token,
            filename: model.filename,
            total_size: model.total_size,
            uploaded_size: model.uploaded_size,
            chunk_count: model.chunk_count,
            temp_file_path: model.temp_file_path,
            status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl From<&UploadSession> for ActiveModel {
    fn from(session: &UploadSession) -> Self {
        ActiveModel {
            id: Set(session.id()),
            upload_token: Set(session.upload_token().to_string()),
            filename: Set(session.filename().to_string()),
            total_size: Set(session.total_size()),
            uploaded_size: Set(session.uploaded_size()),
            chunk_count: Set(session.chunk_count()),
            temp_file_path: Set(session.temp_file_path().map(str::to_string)),
            status: Set(session.status().to_string()),
            created_at: Set(session.created_at()),
            updated_at: Set(session.updated_at()),
        }
    }
}
