use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn session_not_found(upload_token: &str) -> Self {
        AppError::NotFound(format!("Upload session {} not found", upload_token))
    }

    /// Domain errors describe the caller's request, not the health of the
    /// backing stores.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_) | AppError::Validation(_) | AppError::InvalidState(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg),
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (AppError::session_not_found("abc"), StatusCode::NOT_FOUND),
            (AppError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidState("late".into()), StatusCode::CONFLICT),
            (AppError::Storage("s3 down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn only_request_errors_are_domain_errors() {
        assert!(AppError::session_not_found("abc").is_domain());
        assert!(AppError::InvalidState("x".into()).is_domain());
        assert!(!AppError::Storage("x".into()).is_domain());
        assert!(!AppError::Config("x".into()).is_domain());
    }
}
