mod home;
mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::services::chunk_assembler::ChunkAssembler;

// Multipart framing on top of the raw chunk bytes.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub assembler: Arc<ChunkAssembler>,
    pub max_chunk_bytes: usize,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        home::root,
        upload::create_upload,
        upload::upload_chunk,
        upload::get_upload,
        upload::complete_upload,
        upload::fail_upload,
        upload::cancel_upload,
        upload::delete_upload,
    ),
    components(
        schemas(
            home::RootResponse,
            upload::CreateUploadRequest,
            crate::services::chunk_assembler::CreatedSession,
            crate::services::chunk_assembler::ChunkAck,
            crate::services::chunk_assembler::SessionStatus,
            crate::models::UploadStatus,
        )
    ),
    tags(
        (name = "General", description = "General API information"),
        (name = "Chunked Upload", description = "Resumable uploads assembled from byte-range chunks")
    ),
    info(
        title = "ChunkUploadKit API",
        version = "0.1.0",
        description = "Chunked file upload sessions backed by a blob store",
    )
)]
struct ApiDoc;

pub fn create_routes(state: AppState) -> Router {
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    let chunk_limit = DefaultBodyLimit::max(state.max_chunk_bytes + MULTIPART_OVERHEAD);

    let app_routes = Router::new()
        .route("/", get(home::root))
        .route("/uploads", post(upload::create_upload))
        .route(
            "/uploads/{token}",
            get(upload::get_upload).delete(upload::delete_upload),
        )
        .route(
            "/uploads/{token}/chunks",
            post(upload::upload_chunk).layer(chunk_limit),
        )
        .route("/uploads/{token}/complete", post(upload::complete_upload))
        .route("/uploads/{token}/fail", post(upload::fail_upload))
        .route("/uploads/{token}/cancel", post(upload::cancel_upload))
        .with_state(state);

    Router::new()
        .merge(swagger_router)
        .merge(app_routes)
        .layer(TraceLayer::new_for_http())
}
