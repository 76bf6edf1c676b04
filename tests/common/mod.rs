use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use axum::extract::ConnectInfo;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;

use error_page_share::{
    app_router,
    services::{
        rate_limiter::RateLimiter,
        renderer::{ErrorPageRenderer, TemplateRegistry},
        share_store::{FilePageBackend, ShareStore},
    },
    utils::config::AppConfig,
    AppState,
};

/// A router over a temporary page directory. The directory lives as long as
/// this value.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

/// Setup a test application with temporary storage
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}).await
}

/// Setup a test application, adjusting the configuration first
pub async fn setup_test_app_with(adjust: impl FnOnce(&mut AppConfig)) -> TestApp {
    let temp_dir = TempDir::new().unwrap();

    let mut config = AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        data_dir: temp_dir.path().to_str().unwrap().to_string(),
        create_limit_per_minute: 1000,
        create_limit_per_hour: 1000,
        ..AppConfig::default()
    };
    adjust(&mut config);

    let backend = FilePageBackend::open(&config.data_dir)
        .await
        .expect("Failed to open page store");
    let store = ShareStore::new(backend).with_max_attempts(config.max_create_attempts);

    let state = AppState {
        rate_limiter: Arc::new(RateLimiter::with_config(config.create_rate_limit())),
        config: Arc::new(config),
        store: Arc::new(store),
        renderer: ErrorPageRenderer::new(Arc::new(TemplateRegistry::new().unwrap())),
    };

    TestApp {
        router: app_router(state.clone()),
        state,
        _temp_dir: temp_dir,
    }
}

pub fn create_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .uri("/s/create")
        .method("POST")
        .header(header::HOST, "share.example")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

/// Attaches the peer address the server would have seen on the socket
pub fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

pub fn get_request(name: &str, accept: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/s/{}", name))
        .method("GET")
        .header(header::HOST, "share.example")
        .header(header::ACCEPT, accept)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Parameters as the editor submits them
pub fn editor_parameters() -> Value {
    serde_json::json!({
        "title": "Internal server error",
        "error_code": 500,
        "more_information": {
            "hidden": false,
            "text": "cloudflare.com",
            "for": "more information"
        },
        "browser_status": {"status": "ok", "location": "You", "name": "Browser", "status_text": "Working"},
        "cloudflare_status": {"status": "error", "location": "San Francisco", "name": "Cloudflare", "status_text": "Error"},
        "host_status": {"status": "ok", "location": "Website", "name": "Host", "status_text": "Working"},
        "error_source": "cloudflare",
        "what_happened": "There is an internal server error on Cloudflare's network.",
        "what_can_i_do": "Please try again in a few minutes.",
        "time": "2025-01-01 00:00:00 UTC",
        "ray_id": "0123456789abcdef",
        "client_ip": "198.51.100.23"
    })
}
