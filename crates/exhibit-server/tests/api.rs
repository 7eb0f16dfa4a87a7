//! HTTP-level tests for the bench API, running against a mock-radio tag.

use std::time::Duration;

use axum::http::{Request, StatusCode};
use axum_test::TestServer;
use exhibit_core::ExhibitConfig;
use exhibit_server::api::create_router;
use exhibit_server::api::error::ErrorResponse;
use exhibit_server::api::health::HealthResponse;
use exhibit_server::api::tag::{TagStatusResponse, TapResponse, WriteResponse};
use exhibit_server::radio::Radio;
use exhibit_server::state::AppState;
use serde_json::json;
use tower::ServiceExt;

const EXHIBIT_URL: &str = "https://museum.example/exhibits/42";

async fn server_with(config: ExhibitConfig) -> TestServer {
    let radio = Radio::start_mock(&config).await.unwrap();
    TestServer::new(create_router(AppState::new(&radio, config))).unwrap()
}

async fn server() -> TestServer {
    server_with(ExhibitConfig::default()).await
}

async fn status(server: &TestServer) -> TagStatusResponse {
    server.get("/api/tag").await.json::<TagStatusResponse>()
}

#[tokio::test]
async fn test_health_reports_running_tag() {
    let server = server().await;

    let response = server.get("/health").await;
    response.assert_status_ok();
    let health = response.json::<HealthResponse>();
    assert_eq!(health.status, "ok");
    assert!(health.tag_running);
}

#[tokio::test]
async fn test_fresh_tag_is_silent() {
    let server = server().await;

    let tag = status(&server).await;
    assert!(tag.url.is_empty());
    assert_eq!(tag.visit_count, 0);
    assert_eq!(tag.device_name, "MuseumGuide");
    assert!(!tag.emulating);
    assert!(tag.served_url.is_none());

    let tap = server.post("/api/tag/tap").await.json::<TapResponse>();
    assert!(tap.read_url.is_none());
    assert_eq!(tap.visit_count, 0);
}

#[tokio::test]
async fn test_url_write_is_served_over_nfc() {
    let server = server().await;

    let response = server
        .put("/api/tag/url")
        .json(&json!({ "url": EXHIBIT_URL }))
        .await;
    response.assert_status_ok();
    let write = response.json::<WriteResponse>();
    assert_eq!(write.stored_len, EXHIBIT_URL.len());
    assert!(write.truncated_from.is_none());
    assert!(write.degraded.is_none());

    let tag = status(&server).await;
    assert_eq!(tag.url, EXHIBIT_URL);
    assert!(tag.emulating);
    assert_eq!(tag.served_url.as_deref(), Some(EXHIBIT_URL));

    let tap = server.post("/api/tag/tap").await.json::<TapResponse>();
    assert_eq!(tap.read_url.as_deref(), Some(EXHIBIT_URL));
    assert_eq!(tap.visit_count, 1);
}

#[tokio::test]
async fn test_taps_inside_refractory_window_count_once() {
    let server = server().await;
    server
        .put("/api/tag/url")
        .json(&json!({ "url": EXHIBIT_URL }))
        .await
        .assert_status_ok();

    for _ in 0..3 {
        server.post("/api/tag/tap").await.assert_status_ok();
    }
    assert_eq!(status(&server).await.visit_count, 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let tap = server.post("/api/tag/tap").await.json::<TapResponse>();
    assert_eq!(tap.visit_count, 2);
}

#[tokio::test]
async fn test_url_write_resets_visits() {
    let server = server().await;
    server
        .put("/api/tag/url")
        .json(&json!({ "url": EXHIBIT_URL }))
        .await
        .assert_status_ok();
    server.post("/api/tag/tap").await.assert_status_ok();
    assert_eq!(status(&server).await.visit_count, 1);

    server
        .put("/api/tag/url")
        .json(&json!({ "url": "https://museum.example/exhibits/43" }))
        .await
        .assert_status_ok();
    assert_eq!(status(&server).await.visit_count, 0);
}

#[tokio::test]
async fn test_offset_write_splices_url() {
    let server = server().await;
    server
        .put("/api/tag/url")
        .json(&json!({ "url": "https://museum.example/exhibits/42" }))
        .await
        .assert_status_ok();

    let response = server
        .put("/api/tag/url")
        .json(&json!({ "url": "7", "offset": 33 }))
        .await;
    response.assert_status_ok();
    assert_eq!(status(&server).await.url, "https://museum.example/exhibits/47");

    let past_end = server
        .put("/api/tag/url")
        .json(&json!({ "url": "x", "offset": 200 }))
        .await;
    past_end.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(past_end.json::<ErrorResponse>().error, "INVALID_OFFSET");
}

#[tokio::test]
async fn test_url_over_attribute_capacity_is_rejected() {
    let server = server().await;

    let response = server
        .put("/api/tag/url")
        .json(&json!({ "url": "a".repeat(300) }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let error = response.json::<ErrorResponse>();
    assert_eq!(error.error, "INVALID_LENGTH");
    assert_eq!(error.details, Some(json!({ "att_code": 13 })));
    assert!(status(&server).await.url.is_empty());
}

#[tokio::test]
async fn test_unencodable_url_keeps_previous_payload() {
    let server = server().await;
    server
        .put("/api/tag/url")
        .json(&json!({ "url": EXHIBIT_URL }))
        .await
        .assert_status_ok();

    let long_url = "b".repeat(252);
    let response = server
        .put("/api/tag/url")
        .json(&json!({ "url": long_url }))
        .await;
    response.assert_status_ok();
    let write = response.json::<WriteResponse>();
    assert_eq!(write.stored_len, 252);
    assert!(write.degraded.is_some());

    let tag = status(&server).await;
    assert_eq!(tag.url, long_url);
    assert_eq!(tag.served_url.as_deref(), Some(EXHIBIT_URL));
}

#[tokio::test]
async fn test_surfaced_write_failure_is_failed_dependency() {
    let mut config = ExhibitConfig::default();
    config.attributes.surface_write_failures = true;
    let server = server_with(config).await;

    let response = server
        .put("/api/tag/url")
        .json(&json!({ "url": "c".repeat(252) }))
        .await;
    response.assert_status(StatusCode::FAILED_DEPENDENCY);
    assert_eq!(response.json::<ErrorResponse>().error, "ENCODE_FAILED");
    assert_eq!(status(&server).await.url.len(), 252);
}

#[tokio::test]
async fn test_long_name_is_truncated() {
    let server = server().await;

    let name = "N".repeat(65);
    let response = server
        .put("/api/tag/name")
        .json(&json!({ "name": name }))
        .await;
    response.assert_status_ok();
    let write = response.json::<WriteResponse>();
    assert_eq!(write.stored_len, 64);
    assert_eq!(write.truncated_from, Some(65));

    assert_eq!(status(&server).await.device_name, "N".repeat(64));
}

#[tokio::test]
async fn test_rename_keeps_url_and_visits() {
    let server = server().await;
    server
        .put("/api/tag/url")
        .json(&json!({ "url": EXHIBIT_URL }))
        .await
        .assert_status_ok();
    server.post("/api/tag/tap").await.assert_status_ok();

    server
        .put("/api/tag/name")
        .json(&json!({ "name": "Gallery3-Vase" }))
        .await
        .assert_status_ok();

    let tag = status(&server).await;
    assert_eq!(tag.device_name, "Gallery3-Vase");
    assert_eq!(tag.url, EXHIBIT_URL);
    assert_eq!(tag.visit_count, 1);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let radio = Radio::start_mock(&ExhibitConfig::default()).await.unwrap();
    let app = create_router(AppState::new(&radio, ExhibitConfig::default()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/openapi.json")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
