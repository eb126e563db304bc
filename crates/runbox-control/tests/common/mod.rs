#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, Response};
use runbox_agent::{AgentConfig, ProcessManager};
use runbox_control::{AppState, ServerConfig, routes};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_BODY_LIMIT: usize = 64 * 1024;
const BOUNDARY: &str = "runbox-test-boundary";

/// Router wired like `main.rs`, backed by temp dirs. `/bin/sh` stands in for
/// the interpreter and `true` for the installer.
pub struct TestApp {
    _tmp: tempfile::TempDir,
    pub app: Router,
    pub manager: ProcessManager,
}

impl TestApp {
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let mut agent = AgentConfig::with_dirs(tmp.path().join("uploads"), tmp.path().join("processes"));
        agent.interpreter = "/bin/sh".to_string();
        agent.install_program = "true".to_string();
        agent.install_args = Vec::new();
        agent.server_ready_delay = Duration::from_millis(100);
        agent.stop_grace = Duration::from_secs(2);
        agent.base_port = 48000;
        agent.port_span = 500;
        agent.reap_orphans = false;

        let manager = ProcessManager::new(agent).await.unwrap();
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_upload_bytes: TEST_BODY_LIMIT,
            log_dir: None,
        };
        let app = routes::router(AppState::new(manager.clone(), config));
        Self {
            _tmp: tmp,
            app,
            manager,
        }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.app.clone().oneshot(req).await.unwrap()
    }

    pub async fn upload(&self, field: &str, filename: &str, content: &[u8]) -> Response<Body> {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, filename, content)))
            .unwrap();
        self.app.clone().oneshot(req).await.unwrap()
    }

    /// Polls `/api/processes` until the run shows up and satisfies `pred`.
    pub async fn wait_for_run(&self, run_id: &str, pred: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let runs = body_json(self.get("/api/processes").await).await;
            if let Some(run) = runs
                .as_array()
                .unwrap()
                .iter()
                .find(|r| r["id"] == run_id)
                && pred(run)
            {
                return run.clone();
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("run {run_id} never reached the expected state");
    }
}

pub fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: text/x-python\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8_lossy(&bytes).to_string()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing {name} header"))
        .to_str()
        .unwrap()
}
