//! HTTP surface for the export service (§4.9, §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use lb_protocol::config::ControllerConfig;

use crate::error::{ExporterError, ExporterResult};
use crate::state::ExporterState;

pub fn build_router(state: ExporterState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api = Router::new()
        .route("/export/status", get(export_status))
        .route("/export/otp", post(request_otp))
        .route("/export/verify", post(verify_otp))
        .route("/export/download", get(download_config))
        .route("/restart", post(restart));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct ExportStatus {
    otp_required: bool,
    config_present: bool,
}

/// `GET /api/export/status` — whether a cached token or a written config
/// already exists.
async fn export_status(State(state): State<ExporterState>) -> Json<ExportStatus> {
    Json(ExportStatus {
        otp_required: !state.has_token().await,
        config_present: state.config_present(),
    })
}

#[derive(Debug, Deserialize)]
struct OtpRequestBody {
    email: String,
}

/// `POST /api/export/otp` — trigger the vendor OTP e-mail. No state
/// changes besides remembering which e-mail the follow-up verify call
/// belongs to.
async fn request_otp(
    State(state): State<ExporterState>,
    Json(body): Json<OtpRequestBody>,
) -> ExporterResult<StatusCode> {
    if body.email.trim().is_empty() {
        return Err(ExporterError::BadRequest("email is required".into()));
    }
    state.cloud.request_otp(&body.email).await?;
    state.set_pending_email(body.email).await;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
struct VerifyRequestBody {
    code: String,
}

#[derive(Debug, Serialize)]
struct VerifyResponseBody {
    success: bool,
}

/// `POST /api/export/verify` — exchange the OTP code for a bearer token,
/// store it in memory before the config-file write (S4), and export the
/// account's device/group topology.
async fn verify_otp(
    State(state): State<ExporterState>,
    Json(body): Json<VerifyRequestBody>,
) -> ExporterResult<Json<VerifyResponseBody>> {
    if body.code.trim().is_empty() {
        return Err(ExporterError::BadRequest("code is required".into()));
    }
    let email = state
        .take_pending_email()
        .await
        .ok_or_else(|| ExporterError::BadRequest("no otp request is pending".into()))?;

    let (token, expires_in) = state.cloud.verify_otp(&email, &body.code).await?;
    state.store_token(token.clone(), expires_in).await;

    let topology = state.cloud.list_devices(&token).await?;
    write_config(&state, &topology)?;

    Ok(Json(VerifyResponseBody { success: true }))
}

fn write_config(state: &ExporterState, topology: &ControllerConfig) -> ExporterResult<()> {
    state.save_config(topology).map_err(ExporterError::from)
}

/// `GET /api/export/download` — stream the current YAML config, or 404 if
/// nothing has been exported yet.
async fn download_config(State(state): State<ExporterState>) -> ExporterResult<String> {
    std::fs::read_to_string(&state.config_path).map_err(|_| ExporterError::NotExported)
}

/// `POST /api/restart` — signal the process to shut down. The response may
/// race the process exit; clients must treat a connection reset as success.
async fn restart(State(state): State<ExporterState>) -> StatusCode {
    state.shutdown.notify_one();
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn state() -> ExporterState {
        let dir = std::env::temp_dir().join(format!("lb-exporter-routes-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        ExporterState::new(&crate::config::ExporterConfig {
            config_path: dir.join("devices.yaml"),
            token_cache_path: dir.join("token_cache.json"),
            ..crate::config::ExporterConfig::default()
        })
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = build_router(state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_otp_required_before_any_token() {
        let app = build_router(state());
        let response = app
            .oneshot(Request::get("/api/export/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["otp_required"], true);
        assert_eq!(json["config_present"], false);
    }

    #[tokio::test]
    async fn download_without_export_is_not_found() {
        let app = build_router(state());
        let response = app
            .oneshot(Request::get("/api/export/download").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn verify_without_a_pending_otp_request_is_bad_request() {
        let app = build_router(state());
        let body = serde_json::json!({ "code": "123456" });
        let response = app
            .oneshot(
                Request::post("/api/export/verify")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn restart_signals_the_shutdown_notifier() {
        let s = state();
        let app = build_router(s.clone());
        let response = app
            .oneshot(Request::post("/api/restart").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
