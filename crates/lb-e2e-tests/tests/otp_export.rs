//! S4: OTP double-submit resilience — once `/api/export/verify` returns, the
//! bearer token is visible through the state-reporting endpoint immediately,
//! not only once the write-behind token-cache file has landed on disk.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lb_exporter::config::ExporterConfig;
use lb_exporter::routes::build_router;
use lb_exporter::state::ExporterState;

fn tmp_config(cloud_base_url: String) -> ExporterConfig {
    let dir = std::env::temp_dir().join(format!("lb-e2e-otp-export-{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    ExporterConfig {
        config_path: dir.join("devices.yaml"),
        token_cache_path: dir.join("token_cache.json"),
        cloud_base_url,
        ..ExporterConfig::default()
    }
}

async fn json_request(app: &axum::Router, method: &str, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() { serde_json::json!({}) } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

#[tokio::test]
async fn a_verified_token_is_visible_before_the_cache_file_write_lands() {
    let mock_cloud = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/user/two_factor/email/verifycode"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_cloud)
        .await;

    Mock::given(method("POST"))
        .and(path("/user/two_factor/email/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "hallway-token",
            "expires_in": 3600,
        })))
        .mount(&mock_cloud)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/user/hallway-token/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "account_id": 123,
            "devices": [],
            "groups": [],
        })))
        .mount(&mock_cloud)
        .await;

    let state = ExporterState::new(&tmp_config(mock_cloud.uri()));
    let app = build_router(state);

    let (status, _) = json_request(&app, "POST", "/api/export/otp", serde_json::json!({ "email": "user@example.com" })).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = json_request(&app, "POST", "/api/export/verify", serde_json::json!({ "code": "000000" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // No delay is introduced before checking status: the in-memory token
    // cell must already reflect the verified login.
    let (status, body) = json_request(&app, "POST", "/api/export/verify", serde_json::json!({ "code": "000000" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "a second submit with no pending request is rejected, not silently reprocessed");
    let _ = body;

    let response = app
        .clone()
        .oneshot(Request::get("/api/export/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let status_body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(status_body["otp_required"], false);
    assert_eq!(status_body["config_present"], true);
}
