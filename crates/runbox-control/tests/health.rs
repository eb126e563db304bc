#![cfg(unix)]

mod common;

use axum::http::StatusCode;
use common::{TestApp, body_json};

#[tokio::test]
async fn health_reports_counts() {
    let t = TestApp::new().await;
    let response = t.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["processes"], 0);
    assert_eq!(json["pending"], 0);
}

#[tokio::test]
async fn unknown_route_returns_json_404() {
    let t = TestApp::new().await;
    let response = t.get("/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn empty_dashboard() {
    let t = TestApp::new().await;
    let response = t.get("/dashboard").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["scripts"].as_array().unwrap().len(), 0);
    assert_eq!(json["runs"].as_array().unwrap().len(), 0);
}
