use axum::{
    body::Bytes,
    extract::State,
    response::{Html, Response},
};
use serde_json::Value;

use super::{error_response, parse_parameters_body};
use crate::models::errors::AppError;
use crate::services::renderer::RenderOptions;
use crate::services::sanitizer;
use crate::AppState;

/// Render a parameter set without storing it.
///
/// Body: `{"parameters": {...}, "allow_html": false}`. Raw HTML in the
/// free-text fields is only kept when `allow_html` is explicitly true; links
/// with a disallowed scheme are neutralized either way.
pub async fn preview_page(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<Html<String>, Response> {
    let (params, rest) = parse_parameters_body(&body, app_state.config.max_body_size)
        .map_err(|e| error_response(&e))?;

    let allow_html = match rest.get("allow_html") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            return Err(error_response(&AppError::malformed_input(
                "'allow_html' must be a boolean",
            )))
        }
    };

    let params = sanitizer::sanitize_links(&params);
    let options = RenderOptions::new()
        .allow_html(allow_html)
        .arg("resources_base", &app_state.config.resources_base);

    app_state
        .renderer
        .render(&params, &options)
        .map(Html)
        .map_err(|e| {
            tracing::error!("Failed to render preview: {}", e);
            error_response(&e)
        })
}
