use axum::{
    body::Bytes,
    extract::{ConnectInfo, OriginalUri, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;

use super::{
    base_url, client_identity, error_response, failed_response, parse_parameters_body,
    prefers_json,
};
use crate::models::error_page::{keys, CreatorInfo, ErrorPageParams, StatusItem};
use crate::models::errors::AppError;
use crate::services::renderer::{RenderOptions, SHARE_TEMPLATE};
use crate::services::sanitizer;
use crate::AppState;

const PAGE_DESCRIPTION: &str = "Cloudflare error page";
const CREATOR_TEXT: &str = "CF Error Page Editor";

/// Response for a created share link
#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub status: &'static str,
    pub name: String,
    pub url: String,
}

/// Persist a parameter set and return its share link
pub async fn create_page(
    State(app_state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CreateResponse>, Response> {
    let client = client_identity(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        app_state.config.trust_forwarded_for,
    );

    app_state
        .rate_limiter
        .check_rate_limit(&client)
        .await
        .map_err(|e| error_response(&e))?;

    let (params, _) =
        parse_parameters_body(&body, app_state.config.max_body_size).map_err(|e| {
            tracing::debug!("Rejected create request from {}: {}", client, e);
            error_response(&e)
        })?;

    let page = app_state.store.create(params).await.map_err(|e| match e {
        AppError::StoreFailure { .. } | AppError::StoreExhausted { .. } => {
            failed_response(e.status_code())
        }
        other => error_response(&other),
    })?;

    let url = format!(
        "{}{}",
        base_url(&headers, &app_state.config),
        share_path(&page.name)
    );

    Ok(Json(CreateResponse {
        status: "ok",
        name: page.name,
        url,
    }))
}

/// Show a shared page as HTML, or as JSON for the editor
pub async fn get_page(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let is_json = prefers_json(&headers);

    let page = match app_state.store.get(&name).await {
        Ok(page) => page,
        Err(AppError::NotFound { .. }) => {
            return if is_json {
                (StatusCode::NOT_FOUND, Json(json!({ "status": "notfound" }))).into_response()
            } else {
                not_found_page(&app_state)
            };
        }
        Err(e) => {
            tracing::error!("Failed to load shared page {}: {}", name, e);
            return if is_json {
                failed_response(e.status_code())
            } else {
                error_response(&e)
            };
        }
    };

    if is_json {
        return Json(json!({
            "status": "ok",
            "parameters": sanitizer::sanitize_for_json(&page.params),
        }))
        .into_response();
    }

    let base = base_url(&headers, &app_state.config);
    let creator_link = format!("{}{}#from={}", base, app_state.config.editor_path, page.name);
    let params = page.params.with_object(
        keys::CREATOR_INFO,
        &CreatorInfo::editor_backlink(CREATOR_TEXT, creator_link),
    );
    // Shared content is untrusted: the free-text fields are always escaped here.
    let params = sanitizer::sanitize_for_html(&params);

    let options = RenderOptions::new()
        .template(SHARE_TEMPLATE)
        .arg("url", &format!("{}{}", base, uri.path()))
        .arg("site_name", &app_state.config.site_name)
        .arg("description", PAGE_DESCRIPTION)
        .arg("resources_base", &app_state.config.resources_base);

    match app_state.renderer.render(&params, &options) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render shared page {}: {}", page.name, e);
            error_response(&e)
        }
    }
}

pub fn share_path(name: &str) -> String {
    format!("/s/{}", name)
}

fn not_found_page(app_state: &AppState) -> Response {
    let params = ErrorPageParams::new()
        .with(keys::TITLE, "Page not found")
        .with(keys::ERROR_CODE, 404)
        .with(keys::ERROR_SOURCE, "host")
        .with_object(keys::HOST_STATUS, &StatusItem::error("Not Found"))
        .with(keys::WHAT_HAPPENED, "The shared page you are looking for does not exist.")
        .with(keys::WHAT_CAN_I_DO, "Check the link, or create a new page in the editor.");

    let options = RenderOptions::new()
        .allow_html(false)
        .arg("resources_base", &app_state.config.resources_base);

    match app_state.renderer.render(&params, &options) {
        Ok(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render not-found page: {}", e);
            (StatusCode::NOT_FOUND, Json(json!({ "status": "notfound" }))).into_response()
        }
    }
}
