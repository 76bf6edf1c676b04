use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::AppError;

/// Parameter keys with a meaning to the services. Any other key is carried
/// through untouched and handed to the template as-is.
pub mod keys {
    pub const TITLE: &str = "title";
    pub const HTML_TITLE: &str = "html_title";
    pub const ERROR_CODE: &str = "error_code";
    pub const TIME: &str = "time";
    pub const RAY_ID: &str = "ray_id";
    pub const CLIENT_IP: &str = "client_ip";
    pub const BROWSER_STATUS: &str = "browser_status";
    pub const CLOUDFLARE_STATUS: &str = "cloudflare_status";
    pub const HOST_STATUS: &str = "host_status";
    pub const ERROR_SOURCE: &str = "error_source";
    pub const WHAT_HAPPENED: &str = "what_happened";
    pub const WHAT_CAN_I_DO: &str = "what_can_i_do";
    pub const MORE_INFORMATION: &str = "more_information";
    pub const PERF_SEC_BY: &str = "perf_sec_by";
    pub const CREATOR_INFO: &str = "creator_info";
}

/// Free-form fields that may carry HTML fragments.
pub const FREE_TEXT_FIELDS: [&str; 2] = [keys::WHAT_HAPPENED, keys::WHAT_CAN_I_DO];

/// Fields tied to the context of the original submission. They are never
/// echoed back from a shared page.
pub const SUBMISSION_CONTEXT_FIELDS: [&str; 3] = [keys::TIME, keys::RAY_ID, keys::CLIENT_IP];

/// Objects whose `link` member ends up as an `href` in the document.
pub const LINK_OBJECT_FIELDS: [&str; 3] = [
    keys::MORE_INFORMATION,
    keys::PERF_SEC_BY,
    keys::CREATOR_INFO,
];

/// The parameter bag of an error page.
///
/// The key set is open: the well-known keys in [`keys`] drive defaulting and
/// sanitization, everything else is passed to the template verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorPageParams(Map<String, Value>);

impl ErrorPageParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a parameter bag from an arbitrary JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AppError::malformed_input(format!(
                "parameters must be an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True when the key is absent, null, an empty string or `false`.
    pub fn is_blank(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        }
    }

    /// Returns the value as text, the way a template would print it.
    /// Strings come back unquoted; absent or null values are empty.
    pub fn text(&self, key: &str) -> String {
        match self.0.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Serializes a typed sub-object (status item, creator info, ...) under `key`.
    pub fn with_object<T: Serialize>(mut self, key: impl Into<String>, object: &T) -> Self {
        if let Ok(value) = serde_json::to_value(object) {
            self.insert(key, value);
        }
        self
    }

    /// Size of the compact JSON encoding, which is what the store limits.
    pub fn serialized_len(&self) -> Result<usize, AppError> {
        serde_json::to_vec(&self.0)
            .map(|bytes| bytes.len())
            .map_err(|e| {
                AppError::malformed_input(format!("parameters are not serializable: {}", e))
            })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn object_mut(&mut self, key: &str) -> Option<&mut Map<String, Value>> {
        self.0.get_mut(key).and_then(Value::as_object_mut)
    }

    /// Runs `f` on the object stored under `key`. A missing or non-object
    /// value is replaced by an empty object first.
    pub(crate) fn update_object(&mut self, key: &str, f: impl FnOnce(&mut Map<String, Value>)) {
        let mut object = match self.0.remove(key) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        f(&mut object);
        self.0.insert(key.to_string(), Value::Object(object));
    }

    pub(crate) fn string_mut(&mut self, key: &str) -> Option<&mut String> {
        match self.0.get_mut(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ErrorPageParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// State of one hop in the browser / Cloudflare / host diagram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusItem {
    /// `ok` or `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StatusItem {
    pub fn ok() -> Self {
        Self {
            status: Some("ok".to_string()),
            ..Self::default()
        }
    }

    pub fn error(status_text: impl Into<String>) -> Self {
        Self {
            status: Some("error".to_string()),
            status_text: Some(status_text.into()),
            ..Self::default()
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// The "Cloudflare Ray ID / more information" footer link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoreInformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_text: Option<String>,
}

/// The "Performance & security by" footer credit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfSecBy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Marks a rendered page as produced by the editor, with a link back to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatorInfo {
    pub hidden: bool,
    pub text: String,
    pub link: String,
}

impl CreatorInfo {
    pub fn editor_backlink(text: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            hidden: false,
            text: text.into(),
            link: link.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_requires_object() {
        assert!(ErrorPageParams::from_value(json!({"title": "x"})).is_ok());

        let err = ErrorPageParams::from_value(json!(["title"])).unwrap_err();
        assert!(matches!(err, AppError::MalformedInput { .. }));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_is_blank() {
        let params = ErrorPageParams::new()
            .with("empty", "")
            .with("null", Value::Null)
            .with("zero", 0)
            .with("text", "hi");

        assert!(params.is_blank("missing"));
        assert!(params.is_blank("empty"));
        assert!(params.is_blank("null"));
        assert!(!params.is_blank("zero"));
        assert!(!params.is_blank("text"));
    }

    #[test]
    fn test_text_prints_numbers_unquoted() {
        let params = ErrorPageParams::new().with("error_code", 502).with("title", "Bad gateway");
        assert_eq!(params.text("error_code"), "502");
        assert_eq!(params.text("title"), "Bad gateway");
        assert_eq!(params.text("missing"), "");
    }

    #[test]
    fn test_typed_objects_serialize_sparse() {
        let params = ErrorPageParams::new()
            .with_object(keys::HOST_STATUS, &StatusItem::error("Down").at("example.com"))
            .with_object(
                keys::MORE_INFORMATION,
                &MoreInformation {
                    for_text: Some("more information".to_string()),
                    ..MoreInformation::default()
                },
            );

        assert_eq!(
            params.get(keys::HOST_STATUS),
            Some(&json!({"status": "error", "status_text": "Down", "location": "example.com"}))
        );
        assert_eq!(
            params.get(keys::MORE_INFORMATION),
            Some(&json!({"for": "more information"}))
        );
    }

    #[test]
    fn test_serialized_len_matches_compact_json() {
        let params = ErrorPageParams::new().with("a", 1);
        assert_eq!(params.serialized_len().unwrap(), r#"{"a":1}"#.len());
    }
}
