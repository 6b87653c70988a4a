use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chunk_upload_kit::config::Config;
use chunk_upload_kit::error::AppError;
use chunk_upload_kit::routes::{create_routes, AppState};
use chunk_upload_kit::services::build_blob_store;
use chunk_upload_kit::services::chunk_assembler::ChunkAssembler;
use chunk_upload_kit::services::cleanup::CleanupService;
use chunk_upload_kit::services::session_store::{DbSessionStore, SessionStore};

#[derive(Parser)]
#[command(name = "chunk-upload-kit", version, about = "Chunked upload assembly service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations, the stale-session sweep and the HTTP server
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Run one stale-session sweep and exit
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chunk_upload_kit=info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let db = Database::connect(&config.database_url).await?;
    Migrator::up(&db, None).await?;

    if let Some(Command::Migrate) = cli.command {
        info!("migrations applied");
        return Ok(());
    }

    let sessions: Arc<dyn SessionStore> = Arc::new(DbSessionStore::new(db));
    let blobs = build_blob_store(&config).await?;
    let assembler = Arc::new(
        ChunkAssembler::new(sessions.clone(), blobs)
            .with_cleanup_retry_delay(Duration::from_millis(config.cleanup_retry_delay_ms))
            .with_max_upload_bytes(config.max_upload_bytes),
    );

    let stale_after = chrono::Duration::try_hours(config.stale_session_hours)
        .ok_or_else(|| AppError::Config("STALE_SESSION_HOURS is out of range".to_string()))?;
    let cleanup = CleanupService::new(
        assembler.clone(),
        sessions,
        stale_after,
        Duration::from_secs(config.cleanup_interval_secs),
    );

    if let Some(Command::Sweep) = cli.command {
        let removed = cleanup.sweep_once().await?;
        info!(removed, "sweep finished");
        return Ok(());
    }

    tokio::spawn(cleanup.run_scheduler());

    let app = create_routes(AppState {
        assembler,
        max_chunk_bytes: config.max_chunk_bytes,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
