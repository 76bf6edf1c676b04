//! Read-path sanitization of shared parameters.
//!
//! Every pass takes a parameter snapshot by reference and returns a new one;
//! the caller's copy is never touched. Markup in the free-text fields is
//! cleaned with ammonia: only `http`, `https` and relative URLs survive.

use std::collections::HashSet;

use ammonia::{Builder, UrlRelative};
use serde_json::Value;

use crate::models::error_page::{
    ErrorPageParams, FREE_TEXT_FIELDS, LINK_OBJECT_FIELDS, SUBMISSION_CONTEXT_FIELDS,
};

/// Removes `time`, `ray_id` and `client_ip`
pub fn strip_submission_context(params: &ErrorPageParams) -> ErrorPageParams {
    let mut sanitized = params.clone();
    for key in SUBMISSION_CONTEXT_FIELDS {
        sanitized.remove(key);
    }
    sanitized
}

/// HTML-escapes the free-text fields. Absent fields become empty strings so
/// the template always sees plain text for them.
pub fn escape_free_text(params: &ErrorPageParams) -> ErrorPageParams {
    let mut escaped = params.clone();
    for key in FREE_TEXT_FIELDS {
        let text = params.text(key);
        escaped.insert(key, tera::escape_html(&text));
    }
    escaped
}

/// Neutralizes hyperlinks with a disallowed scheme, in the free-text markup
/// and in the footer / creator objects.
pub fn sanitize_links(params: &ErrorPageParams) -> ErrorPageParams {
    sanitize_link_fields(&clean_free_text_markup(params))
}

/// Runs the free-text fields through the markup cleaner. Anchors keep their
/// content but lose an `href` with a disallowed scheme, however the markup
/// is malformed.
pub fn clean_free_text_markup(params: &ErrorPageParams) -> ErrorPageParams {
    let cleaner = markup_cleaner();
    let mut sanitized = params.clone();

    for key in FREE_TEXT_FIELDS {
        if let Some(text) = sanitized.string_mut(key) {
            let cleaned = cleaner.clean(text).to_string();
            *text = cleaned;
        }
    }

    sanitized
}

/// Drops the `link` member of the footer / creator objects when it is not a
/// safe link, so the template falls back to plain text.
pub fn sanitize_link_fields(params: &ErrorPageParams) -> ErrorPageParams {
    let mut sanitized = params.clone();

    for key in LINK_OBJECT_FIELDS {
        if let Some(object) = sanitized.object_mut(key) {
            let unsafe_link = match object.get("link") {
                Some(Value::String(link)) => !is_safe_link(link),
                Some(Value::Null) | None => false,
                Some(_) => true,
            };
            if unsafe_link {
                tracing::debug!("Dropping unsafe link from {}", key);
                object.remove("link");
            }
        }
    }

    sanitized
}

fn markup_cleaner() -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .url_schemes(HashSet::from(["http", "https"]))
        .url_relative(UrlRelative::PassThrough)
        .add_generic_attributes(["class"]);
    builder
}

/// Parameters as returned to JSON clients re-editing a shared page
pub fn sanitize_for_json(params: &ErrorPageParams) -> ErrorPageParams {
    strip_submission_context(params)
}

/// Parameters as embedded into a publicly rendered shared page. The escaped
/// free text carries no markup, so only the object links need checking.
pub fn sanitize_for_html(params: &ErrorPageParams) -> ErrorPageParams {
    sanitize_link_fields(&escape_free_text(&strip_submission_context(params)))
}

/// True if `href` is relative or uses `http`/`https`.
///
/// Browsers ignore ASCII whitespace and control characters inside a scheme,
/// so those are removed before looking at it. A character reference before
/// the first path delimiter could hide a colon and is rejected outright.
pub fn is_safe_link(href: &str) -> bool {
    let compact: String = href
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .collect();

    let head_end = compact
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(compact.len());
    let head = &compact[..head_end];

    if head.contains('&') {
        return false;
    }

    match head.find(':') {
        None => true,
        Some(pos) => {
            let scheme = head[..pos].to_ascii_lowercase();
            scheme == "http" || scheme == "https"
        }
    }
}
