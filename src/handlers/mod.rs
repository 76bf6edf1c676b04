// HTTP request handlers

pub mod health;
pub mod preview;
pub mod share;

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};

use crate::models::error_page::ErrorPageParams;
use crate::models::errors::AppError;
use crate::services::rate_limiter::identifier_from_ip;
use crate::utils::config::AppConfig;

/// Rate limit key of the caller: the peer address, or the first
/// `X-Forwarded-For` hop when `trust_forwarded_for` is set.
pub(crate) fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded_for)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match (forwarded, peer) {
        (Some(hop), _) => match hop.parse::<IpAddr>() {
            Ok(ip) => identifier_from_ip(ip),
            Err(_) => hop.to_string(),
        },
        (None, Some(addr)) => identifier_from_ip(addr.ip()),
        (None, None) => "unknown".to_string(),
    }
}

/// Scheme and authority clients reach us under, without a trailing slash
pub(crate) fn base_url(headers: &HeaderMap, config: &AppConfig) -> String {
    if let Some(public_url) = &config.public_url {
        return public_url.clone();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim().to_string())
        .filter(|value| value == "http" || value == "https")
        .unwrap_or_else(|| "http".to_string());

    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| config.bind_address());

    format!("{}://{}", scheme, host)
}

/// True if the client asked for JSON
pub(crate) fn prefers_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains(mime::APPLICATION_JSON.essence_str()))
}

/// Generic JSON error response, with `Retry-After` where it applies
pub(crate) fn error_response(error: &AppError) -> Response {
    let mut response = error.to_response().into_response();
    if let AppError::RateLimited { retry_after, .. } = error {
        if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

/// Pulls the parameter object out of a JSON request body.
///
/// The size check runs before any parsing.
pub(crate) fn parse_parameters_body(
    body: &[u8],
    max_body_size: usize,
) -> Result<(ErrorPageParams, Value), AppError> {
    if body.len() > max_body_size {
        return Err(AppError::payload_too_large(body.len(), max_body_size));
    }

    let mut request: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::malformed_input(format!("invalid JSON body: {}", e)))?;

    let parameters = request
        .as_object_mut()
        .and_then(|object| object.remove("parameters"))
        .ok_or_else(|| AppError::malformed_input("missing 'parameters'"))?;

    Ok((ErrorPageParams::from_value(parameters)?, request))
}

pub(crate) fn failed_response(status: StatusCode) -> Response {
    (status, Json(json!({ "status": "failed" }))).into_response()
}
