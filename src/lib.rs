// Library exports for testing and external use

pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use services::rate_limiter::RateLimiter;
use services::renderer::ErrorPageRenderer;
use services::share_store::{FilePageBackend, ShareStore};
use utils::config::AppConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<ShareStore<FilePageBackend>>,
    pub renderer: ErrorPageRenderer,
    pub rate_limiter: Arc<RateLimiter>,
}

/// Routes of the share service, without middleware
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/preview", post(handlers::preview::preview_page))
        .route("/s/create", post(handlers::share::create_page))
        .route("/s/:name", get(handlers::share::get_page))
        .with_state(state)
}
