use axum::http::{HeaderValue, Method};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use error_page_share::{
    app_router,
    services::{
        name_generator::RandomNameGenerator,
        rate_limiter::RateLimiter,
        renderer::{ErrorPageRenderer, TemplateRegistry},
        share_store::{FilePageBackend, ShareStore},
    },
    utils::config::AppConfig,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "error_page_share=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting error page share server");

    let config = AppConfig::from_env();
    tracing::info!("Configuration loaded: {:?}", config);

    let registry = TemplateRegistry::new()?;
    let renderer = ErrorPageRenderer::new(Arc::new(registry));

    let backend = FilePageBackend::open(&config.data_dir).await.map_err(|e| {
        tracing::error!("Failed to open page store: {}", e);
        e
    })?;
    let store = ShareStore::new(backend)
        .with_generator(Arc::new(RandomNameGenerator::new(config.name_length)))
        .with_max_attempts(config.max_create_attempts)
        .with_max_params_size(config.max_body_size);

    let rate_limiter = Arc::new(RateLimiter::with_config(config.create_rate_limit()));
    tracing::info!("Create rate limit windows: {:?}", rate_limiter.config().windows);

    // Prune idle rate limit records
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(600));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup_expired().await;
        }
    });

    let app_state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(store),
        renderer,
        rate_limiter,
    };

    let app = app_router(app_state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(config.request_timeout()))
            .layer(cors_layer(&config)),
    );

    let addr: SocketAddr = config.bind_address().parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if config.cors_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
