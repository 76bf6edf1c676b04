use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::name_generator::{DEFAULT_NAME_LENGTH, MAX_NAME_LENGTH};
use crate::services::rate_limiter::{RateLimitConfig, RateWindow};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding one JSON record per shared page
    pub data_dir: String,
    /// Largest accepted request body, in bytes
    pub max_body_size: usize,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
    /// Absolute base URL used in share links, e.g. `https://example.com`.
    /// Derived from the request when unset.
    pub public_url: Option<String>,
    /// Path of the editor, the target of the creator back-link
    pub editor_path: String,
    pub site_name: String,
    /// Base URL of the error page stylesheet and icons
    pub resources_base: String,
    pub name_length: usize,
    pub max_create_attempts: usize,
    pub create_limit_per_minute: usize,
    pub create_limit_per_hour: usize,
    /// Key rate limits by the first `X-Forwarded-For` hop. Only safe behind a
    /// proxy that sets the header itself.
    pub trust_forwarded_for: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            data_dir: "./data/pages".to_string(),
            max_body_size: 4096,
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
            public_url: None,
            editor_path: "/editor/".to_string(),
            site_name: "moe::virt".to_string(),
            resources_base: "/cdn-cgi".to_string(),
            name_length: DEFAULT_NAME_LENGTH,
            max_create_attempts: 5,
            create_limit_per_minute: 20,
            create_limit_per_hour: 500,
            trust_forwarded_for: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from any key lookup; unset or unparsable values
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        parse_into(&lookup, "PORT", &mut config.port);
        if let Some(data_dir) = lookup("DATA_DIR") {
            config.data_dir = data_dir;
        }
        parse_into(&lookup, "MAX_BODY_SIZE", &mut config.max_body_size);
        if let Some(origins) = lookup("CORS_ORIGINS") {
            config.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }
        parse_into(&lookup, "REQUEST_TIMEOUT_SECONDS", &mut config.request_timeout_seconds);
        if let Some(public_url) = lookup("PUBLIC_URL") {
            let trimmed = public_url.trim().trim_end_matches('/').to_string();
            config.public_url = (!trimmed.is_empty()).then_some(trimmed);
        }
        if let Some(editor_path) = lookup("EDITOR_PATH") {
            config.editor_path = editor_path;
        }
        if let Some(site_name) = lookup("SITE_NAME") {
            config.site_name = site_name;
        }
        if let Some(resources_base) = lookup("RESOURCES_BASE") {
            config.resources_base = resources_base.trim_end_matches('/').to_string();
        }
        parse_into(&lookup, "NAME_LENGTH", &mut config.name_length);
        if !(1..=MAX_NAME_LENGTH).contains(&config.name_length) {
            tracing::warn!(
                "NAME_LENGTH must be between 1 and {}, using {}",
                MAX_NAME_LENGTH,
                DEFAULT_NAME_LENGTH
            );
            config.name_length = DEFAULT_NAME_LENGTH;
        }
        parse_into(&lookup, "MAX_CREATE_ATTEMPTS", &mut config.max_create_attempts);
        parse_into(&lookup, "CREATE_LIMIT_PER_MINUTE", &mut config.create_limit_per_minute);
        parse_into(&lookup, "CREATE_LIMIT_PER_HOUR", &mut config.create_limit_per_hour);
        parse_into(&lookup, "TRUST_FORWARDED_FOR", &mut config.trust_forwarded_for);

        config
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Windows applied to page creation
    pub fn create_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            windows: vec![
                RateWindow::per_minute(self.create_limit_per_minute),
                RateWindow::per_hour(self.create_limit_per_hour),
            ],
        }
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.max_body_size, 4096);
        assert_eq!(config.name_length, 8);
        assert_eq!(config.max_create_attempts, 5);
        assert!(config.public_url.is_none());
        assert_eq!(
            config.create_rate_limit().windows,
            vec![RateWindow::per_minute(20), RateWindow::per_hour(500)]
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("PUBLIC_URL", "https://example.com/"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("CREATE_LIMIT_PER_MINUTE", "3"),
            ("RESOURCES_BASE", "https://cdn.example/res/"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.public_url.as_deref(), Some("https://example.com"));
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.create_rate_limit().windows[0].max_requests, 3);
        assert_eq!(config.resources_base, "https://cdn.example/res");
    }

    #[test]
    fn test_invalid_numbers_keep_defaults() {
        let config = config_from(&[("PORT", "not-a-port"), ("NAME_LENGTH", "-1")]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.name_length, 8);
    }

    #[test]
    fn test_name_length_outside_valid_names_is_rejected() {
        assert_eq!(config_from(&[("NAME_LENGTH", "0")]).name_length, 8);
        assert_eq!(config_from(&[("NAME_LENGTH", "65")]).name_length, 8);
        assert_eq!(config_from(&[("NAME_LENGTH", "64")]).name_length, 64);
        assert_eq!(config_from(&[("NAME_LENGTH", "12")]).name_length, 12);
    }

    #[test]
    fn test_forwarded_for_is_opt_in() {
        assert!(!config_from(&[]).trust_forwarded_for);
        assert!(config_from(&[("TRUST_FORWARDED_FOR", "true")]).trust_forwarded_for);
        assert!(!config_from(&[("TRUST_FORWARDED_FOR", "yes")]).trust_forwarded_for);
    }
}
