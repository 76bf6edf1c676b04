use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::AppState;

/// Liveness plus a cheap check that the page store is readable
pub async fn health_check(
    State(app_state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let pages = app_state.store.count().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "message": e.public_message()
            })),
        )
    })?;

    Ok(Json(json!({
        "status": "ok",
        "pages": pages,
        "templates": app_state.renderer.registry().template_names(),
        "timestamp": chrono::Utc::now().timestamp()
    })))
}
