//! Unified API error type with Axum `IntoResponse` support.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error type for the export HTTP surface, converting directly to the
/// JSON error body every handler returns.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("no config has been exported yet")]
    NotExported,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("vendor cloud login failed: {0}")]
    CloudLogin(String),

    #[error("failed to read or write local state: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to persist configuration: {0}")]
    Config(#[from] lb_protocol::config::ConfigError),
}

impl IntoResponse for ExporterError {
    fn into_response(self) -> Response {
        let status = match &self {
            ExporterError::NotExported => StatusCode::NOT_FOUND,
            ExporterError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ExporterError::CloudLogin(_) => StatusCode::BAD_GATEWAY,
            ExporterError::Io(_) | ExporterError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        (status, axum::Json(body)).into_response()
    }
}

pub type ExporterResult<T> = Result<T, ExporterError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn not_exported_is_404() {
        let err = ExporterError::NotExported;
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 404);
    }

    #[tokio::test]
    async fn bad_request_is_400() {
        let err = ExporterError::BadRequest("missing code".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cloud_login_failure_is_502() {
        let err = ExporterError::CloudLogin("otp rejected".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
