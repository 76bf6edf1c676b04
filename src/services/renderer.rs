//! Error page rendering.
//!
//! Templates live in a [`TemplateRegistry`] built once at startup. The default
//! document is `error.html`; other templates extend it (directly or through
//! further templates) and override its `header` or `style` blocks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tera::{Context, Tera};

use crate::models::error_page::{keys, ErrorPageParams, FREE_TEXT_FIELDS};
use crate::models::errors::AppError;
use crate::services::name_generator::generate_ray_id;
use crate::services::sanitizer;

/// Base document every other template extends
pub const DEFAULT_TEMPLATE: &str = "error.html";
/// Base document plus social-card metadata, used for shared pages
pub const SHARE_TEMPLATE: &str = "share.html";

/// Random bytes in a synthesized Ray ID (rendered as twice as many hex digits)
pub const RAY_ID_BYTES: usize = 8;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
const DEFAULT_TITLE: &str = "Internal server error";
const DEFAULT_ERROR_CODE: u16 = 500;
const CLOUDFLARE_LINK: &str = "https://www.cloudflare.com/5xx-error-landing";

/// Immutable set of compiled templates
pub struct TemplateRegistry {
    tera: Tera,
}

impl TemplateRegistry {
    /// Loads the built-in templates
    pub fn new() -> Result<Self, AppError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html", ".htm", ".xml"]);
        tera.add_raw_templates(vec![
            (DEFAULT_TEMPLATE, include_str!("../../templates/error.html")),
            (SHARE_TEMPLATE, include_str!("../../templates/share.html")),
        ])
        .map_err(|e| template_error("failed to load built-in templates", &e))?;

        Ok(Self { tera })
    }

    /// Adds a caller-supplied template. It may extend any template registered
    /// before it, so override chains are built parent first. Names must end in
    /// `.html` so output escaping stays on.
    pub fn with_template(mut self, name: &str, source: &str) -> Result<Self, AppError> {
        if !name.ends_with(".html") {
            return Err(AppError::template(format!(
                "template name '{}' must end with .html",
                name
            )));
        }

        self.tera
            .add_raw_template(name, source)
            .map_err(|e| template_error(&format!("invalid template '{}'", name), &e))?;

        tracing::debug!("Registered template {}", name);
        Ok(self)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn template_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tera.get_template_names().map(str::to_string).collect();
        names.sort();
        names
    }

    fn render(&self, name: &str, context: &Context) -> Result<String, AppError> {
        self.tera
            .render(name, context)
            .map_err(|e| template_error(&format!("failed to render '{}'", name), &e))
    }
}

fn template_error(prefix: &str, error: &tera::Error) -> AppError {
    let mut message = format!("{}: {}", prefix, error);
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    AppError::template(message)
}

/// Options for a single render call
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Output `what_happened` / `what_can_i_do` as raw HTML. Turn off when the
    /// source of the parameters is not trusted.
    pub allow_html: bool,
    /// Template to render, defaults to [`DEFAULT_TEMPLATE`]
    pub template: Option<String>,
    /// Extra variables visible to the template next to `params`
    pub extra: Context,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            allow_html: true,
            template: None,
            extra: Context::new(),
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_html(mut self, allow_html: bool) -> Self {
        self.allow_html = allow_html;
        self
    }

    pub fn template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    pub fn arg<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Self {
        self.extra.insert(key, value);
        self
    }
}

/// Renders error pages from a shared template registry
#[derive(Clone)]
pub struct ErrorPageRenderer {
    registry: Arc<TemplateRegistry>,
}

impl ErrorPageRenderer {
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Renders with the default template and raw HTML allowed
    pub fn render_default(&self, params: &ErrorPageParams) -> Result<String, AppError> {
        self.render(params, &RenderOptions::default())
    }

    /// Renders an error page. The caller's parameters are not modified; the
    /// clock is read once per call to fill a missing `time`.
    pub fn render(
        &self,
        params: &ErrorPageParams,
        options: &RenderOptions,
    ) -> Result<String, AppError> {
        let prepared = prepare_params(params, options.allow_html, Utc::now());
        let template = options.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);

        let mut context = options.extra.clone();
        context.insert("params", &prepared);

        self.registry.render(template, &context)
    }
}

/// Everything `render` does to the parameters before templating, as a pure
/// function of its inputs (plus the randomness of a synthesized Ray ID).
pub fn prepare_params(
    params: &ErrorPageParams,
    allow_html: bool,
    now: DateTime<Utc>,
) -> ErrorPageParams {
    let mut prepared = fill_trace_defaults(params, now);
    if !allow_html {
        prepared = sanitizer::escape_free_text(&prepared);
    }
    fill_page_defaults(&prepared)
}

/// Fills a blank `time` with `now` and a blank `ray_id` with a random token
pub fn fill_trace_defaults(params: &ErrorPageParams, now: DateTime<Utc>) -> ErrorPageParams {
    let mut filled = params.clone();
    if filled.is_blank(keys::TIME) {
        filled.insert(keys::TIME, format_time(now));
    }
    if filled.is_blank(keys::RAY_ID) {
        filled.insert(keys::RAY_ID, generate_ray_id(RAY_ID_BYTES));
    }
    filled
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Fills the presentation fields the template relies on: title, status
/// diagram, footer links. Values the caller set are kept.
pub fn fill_page_defaults(params: &ErrorPageParams) -> ErrorPageParams {
    let mut filled = params.clone();

    if filled.is_blank(keys::TITLE) {
        filled.insert(keys::TITLE, DEFAULT_TITLE);
    }
    if filled.is_blank(keys::ERROR_CODE) {
        filled.insert(keys::ERROR_CODE, DEFAULT_ERROR_CODE);
    }
    if filled.is_blank(keys::HTML_TITLE) {
        let html_title = derive_html_title(&filled);
        filled.insert(keys::HTML_TITLE, html_title);
    }
    if filled.is_blank(keys::ERROR_SOURCE) {
        filled.insert(keys::ERROR_SOURCE, "host");
    }
    for key in FREE_TEXT_FIELDS {
        if !filled.contains_key(key) || filled.get(key) == Some(&Value::Null) {
            filled.insert(key, "");
        }
    }

    let error_source = filled.text(keys::ERROR_SOURCE);
    let status_items = [
        (keys::BROWSER_STATUS, "browser", "Browser", "You"),
        (keys::CLOUDFLARE_STATUS, "cloudflare", "Cloudflare", "Cloudflare"),
        (keys::HOST_STATUS, "host", "Host", "Website"),
    ];
    for (key, source, name, location) in status_items {
        fill_status_item(&mut filled, key, source, name, location, &error_source);
    }

    // The default link only goes with the default text: a caller's own text
    // without a link renders as plain text.
    filled.update_object(keys::MORE_INFORMATION, |info| {
        fill_if_absent(info, "hidden", Value::Bool(false));
        if fill_if_blank(info, "text", "cloudflare.com") {
            fill_if_absent(info, "link", Value::from(CLOUDFLARE_LINK));
        }
        fill_if_blank(info, "for", "more information");
    });
    filled.update_object(keys::PERF_SEC_BY, |perf| {
        if fill_if_blank(perf, "text", "Cloudflare") {
            fill_if_absent(perf, "link", Value::from(CLOUDFLARE_LINK));
        }
    });
    filled.update_object(keys::CREATOR_INFO, |creator| {
        fill_if_absent(creator, "hidden", Value::Bool(true));
        fill_if_blank(creator, "text", "");
    });

    filled
}

/// `"{error_code}: {title}"`, or just the title when the code is not numeric
pub fn derive_html_title(params: &ErrorPageParams) -> String {
    let title = if params.is_blank(keys::TITLE) {
        DEFAULT_TITLE.to_string()
    } else {
        params.text(keys::TITLE)
    };

    let numeric_code = match params.get(keys::ERROR_CODE) {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) if s.trim().parse::<f64>().is_ok() => Some(s.trim().to_string()),
        _ => None,
    };

    match numeric_code {
        Some(code) => format!("{}: {}", code, title),
        None => title,
    }
}

fn fill_status_item(
    params: &mut ErrorPageParams,
    key: &str,
    source: &str,
    name: &str,
    location: &str,
    error_source: &str,
) {
    params.update_object(key, |item| {
        let default_status = if error_source == source { "error" } else { "ok" };
        fill_if_blank(item, "status", default_status);

        let status_text = match item.get("status").and_then(Value::as_str) {
            Some("ok") => "Working",
            _ => "Error",
        };
        fill_if_blank(item, "status_text", status_text);
        fill_if_blank(item, "name", name);
        fill_if_blank(item, "location", location);
    });
}

fn fill_if_absent(object: &mut Map<String, Value>, key: &str, value: Value) {
    if matches!(object.get(key), None | Some(Value::Null)) {
        object.insert(key.to_string(), value);
    }
}

/// Returns true if the default was written
fn fill_if_blank(object: &mut Map<String, Value>, key: &str, value: &str) -> bool {
    let blank = match object.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    };
    if blank {
        object.insert(key.to_string(), Value::from(value));
    }
    blank
}
