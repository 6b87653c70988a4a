use axum::response::Json;
use serde::Serialize;

#[derive(Serialize, utoipa::ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner", body = RootResponse)
    ),
    tag = "General"
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Chunked upload service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: vec![
            "POST /uploads".to_string(),
            "POST /uploads/{token}/chunks".to_string(),
            "GET /uploads/{token}".to_string(),
            "POST /uploads/{token}/complete".to_string(),
            "POST /uploads/{token}/fail".to_string(),
            "POST /uploads/{token}/cancel".to_string(),
            "DELETE /uploads/{token}".to_string(),
            "/swagger-ui/".to_string(),
        ],
    })
}
