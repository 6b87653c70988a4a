use std::sync::Arc;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};

use chunk_upload_kit::entities::upload_session;
use chunk_upload_kit::error::AppError;
use chunk_upload_kit::models::{UploadSession, UploadStatus};
use chunk_upload_kit::services::blob_store::MemoryBlobStore;
use chunk_upload_kit::services::chunk_assembler::ChunkAssembler;
use chunk_upload_kit::services::session_store::{DbSessionStore, SessionStore};

async fn connect() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("sqlite connection");
    Migrator::up(&db, None).await.expect("migrations");
    db
}

#[tokio::test]
async fn save_inserts_then_updates_by_id() {
    let store = DbSessionStore::new(connect().await);

    let session = UploadSession::create("tok-1", "video.mp4", 10).unwrap();
    let mut session = store.save(session).await.unwrap();

    session.set_status(UploadStatus::Uploading);
    session.set_temp_file_path("chunks/tok-1/file.mp4");
    session.update_uploaded_size(5);
    session.increment_chunk_count();
    store.save(session.clone()).await.unwrap();

    let loaded = store.get_by_token("tok-1").await.unwrap().expect("stored");
    assert_eq!(loaded.id(), session.id());
    assert_eq!(loaded.status(), UploadStatus::Uploading);
    assert_eq!(loaded.uploaded_size(), 5);
    assert_eq!(loaded.chunk_count(), 1);
    assert_eq!(loaded.temp_file_path(), Some("chunks/tok-1/file.mp4"));
    assert_eq!(loaded.total_size(), 10);
}

#[tokio::test]
async fn missing_token_returns_none_and_delete_removes_row() {
    let store = DbSessionStore::new(connect().await);
    assert!(store.get_by_token("nope").await.unwrap().is_none());

    let session = store
        .save(UploadSession::create("tok-2", "a.bin", 1).unwrap())
        .await
        .unwrap();
    store.delete(&session).await.unwrap();
    assert!(store.get_by_token("tok-2").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_status_in_a_row_is_rejected_on_load() {
    let db = connect().await;
    let store = DbSessionStore::new(db.clone());

    let session = store
        .save(UploadSession::create("tok-3", "a.bin", 1).unwrap())
        .await
        .unwrap();

    let row = upload_session::Entity::find_by_id(session.id())
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    let mut active: upload_session::ActiveModel = row.into();
    active.status = Set("paused".to_string());
    active.update(&db).await.unwrap();

    assert!(matches!(
        store.get_by_token("tok-3").await,
        Err(AppError::Validation(_))
    ));
}

#[tokio::test]
async fn list_stale_filters_on_updated_at() {
    let store = DbSessionStore::new(connect().await);
    store
        .save(UploadSession::create("tok-4", "a.bin", 1).unwrap())
        .await
        .unwrap();

    let past = chrono::Utc::now().naive_utc() - chrono::Duration::hours(1);
    assert!(store.list_stale(past).await.unwrap().is_empty());

    let future = chrono::Utc::now().naive_utc() + chrono::Duration::hours(1);
    let stale = store.list_stale(future).await.unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].upload_token(), "tok-4");
}

#[tokio::test]
async fn assembler_runs_against_the_database_store() {
    let sessions = Arc::new(DbSessionStore::new(connect().await));
    let blobs = Arc::new(MemoryBlobStore::new());
    let assembler = ChunkAssembler::new(sessions, blobs.clone());

    let token = assembler.create_session("notes.txt", 6).await.unwrap().upload_token;
    assembler.append_chunk(&token, b"hel", 0, 3).await.unwrap();
    let ack = assembler.upload_chunk(&token, b"lo!", 3, 3).await.unwrap();
    assert!(ack.completed);

    let file = assembler.complete_upload(&token).await.unwrap();
    assert_eq!(file.into_bytes(), b"hello!");
    assert!(matches!(
        assembler.get_status(&token).await,
        Err(AppError::NotFound(_))
    ));
    assert!(blobs.keys().await.is_empty());
}
