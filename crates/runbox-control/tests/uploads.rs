#![cfg(unix)]

mod common;

use axum::http::StatusCode;
use common::{TEST_BODY_LIMIT, TestApp, body_json, body_text, header};

#[tokio::test]
async fn batch_script_runs_without_a_port() {
    let t = TestApp::new().await;
    let response = t.upload("file", "hello.py", b"echo hello\nsleep 1\n").await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(header(&response, "location"), "/dashboard");
    let run_id = header(&response, "x-run-id").to_string();
    assert_eq!(run_id.len(), 8);
    assert!(header(&response, "x-runbox-notice").contains(&run_id));

    let run = t.wait_for_run(&run_id, |_| true).await;
    assert_eq!(run["filename"], "hello.py");
    assert_eq!(run["mode"], "batch");
    assert!(run["port"].is_null());

    t.wait_for_run(&run_id, |r| r["running"] == false).await;

    let log = body_text(t.get(&format!("/view_log/{run_id}")).await).await;
    assert!(log.contains("hello"), "{log}");

    let dashboard = body_json(t.get("/dashboard").await).await;
    assert_eq!(dashboard["scripts"][0]["name"], "hello.py");
    assert_eq!(dashboard["runs"][0]["id"], run_id.as_str());
}

#[tokio::test]
async fn wrong_extension_is_rejected() {
    let t = TestApp::new().await;
    let response = t.upload("file", "notes.txt", b"hi").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");
    assert_eq!(t.manager.run_count().await, 0);
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let t = TestApp::new().await;
    let response = t.upload("attachment", "hello.py", b"echo hi\n").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_filename_is_rejected() {
    let t = TestApp::new().await;
    let response = t.upload("file", "", b"echo hi\n").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let t = TestApp::new().await;
    let content = vec![b'#'; TEST_BODY_LIMIT * 2];
    let response = t.upload("file", "big.py", &content).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let dashboard = body_json(t.get("/dashboard").await).await;
    assert_eq!(dashboard["scripts"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn uploaded_name_is_sanitized() {
    let t = TestApp::new().await;
    let response = t.upload("file", "../../my script.py", b"echo hi\n").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let download = t.get("/download/my_script.py").await;
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(body_text(download).await, "echo hi\n");
}

#[tokio::test]
async fn download_is_an_attachment() {
    let t = TestApp::new().await;
    t.upload("file", "hello.py", b"echo hello\n").await;

    let response = t.get("/download/hello.py").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-disposition"),
        "attachment; filename=\"hello.py\""
    );
    assert_eq!(body_text(response).await, "echo hello\n");
}

#[tokio::test]
async fn missing_files_are_404() {
    let t = TestApp::new().await;
    for uri in [
        "/download/ghost.py",
        "/start/ghost.py",
        "/delete/ghost.py",
        "/view_log/deadbeef",
    ] {
        let response = t.get(uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
    assert_eq!(t.manager.run_count().await, 0);
}
