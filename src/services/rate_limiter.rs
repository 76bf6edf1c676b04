use crate::models::errors::AppError;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// One sliding window: at most `max_requests` within `window_duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub max_requests: usize,
    pub window_duration: Duration,
}

impl RateWindow {
    pub fn per_minute(max_requests: usize) -> Self {
        Self {
            max_requests,
            window_duration: Duration::from_secs(60),
        }
    }

    pub fn per_hour(max_requests: usize) -> Self {
        Self {
            max_requests,
            window_duration: Duration::from_secs(3600),
        }
    }
}

/// Rate limit configuration. A request must fit in every window.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub windows: Vec<RateWindow>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            windows: vec![RateWindow::per_minute(20), RateWindow::per_hour(500)],
        }
    }
}

impl RateLimitConfig {
    fn longest_window(&self) -> Duration {
        self.windows
            .iter()
            .map(|w| w.window_duration)
            .max()
            .unwrap_or_default()
    }
}

/// Request timestamps of one client, oldest first
#[derive(Debug, Clone, Default)]
struct RequestRecord {
    timestamps: Vec<Instant>,
}

impl RequestRecord {
    /// Removes timestamps older than `retention`
    fn cleanup(&mut self, now: Instant, retention: Duration) {
        self.timestamps
            .retain(|&timestamp| now.duration_since(timestamp) < retention);
    }

    fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.timestamps
            .iter()
            .filter(|&&timestamp| now.duration_since(timestamp) < window)
            .count()
    }

    /// Time until the oldest request inside `window` leaves it
    fn retry_after(&self, now: Instant, window: Duration) -> Duration {
        self.timestamps
            .iter()
            .find(|&&timestamp| now.duration_since(timestamp) < window)
            .map(|&oldest| window.saturating_sub(now.duration_since(oldest)))
            .unwrap_or_default()
    }
}

/// Per-client rate limiter, shared between request handlers
#[derive(Clone)]
pub struct RateLimiter {
    records: Arc<RwLock<HashMap<String, RequestRecord>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// A limiter with the default create quota
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Checks if a request from the given identifier is allowed, and counts it
    /// if so. Rejected requests are not counted.
    pub async fn check_rate_limit(&self, identifier: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut records = self.records.write().await;

        let record = records.entry(identifier.to_string()).or_default();
        record.cleanup(now, self.config.longest_window());

        for window in &self.config.windows {
            if record.count_within(now, window.window_duration) >= window.max_requests {
                let retry_after = record.retry_after(now, window.window_duration);
                tracing::warn!("Rate limit hit for {}", identifier);
                return Err(AppError::rate_limited(
                    format!(
                        "{} requests per {} seconds",
                        window.max_requests,
                        window.window_duration.as_secs()
                    ),
                    retry_after.as_secs().max(1),
                ));
            }
        }

        record.timestamps.push(now);
        Ok(())
    }

    /// Drops clients with no request inside the longest window. Returns the
    /// number of clients dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.longest_window();
        let mut records = self.records.write().await;
        let initial_count = records.len();

        for record in records.values_mut() {
            record.cleanup(now, retention);
        }
        records.retain(|_, record| !record.timestamps.is_empty());

        let removed_count = initial_count - records.len();
        if removed_count > 0 {
            tracing::debug!("Cleaned up {} expired rate limit records", removed_count);
        }

        removed_count
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rate limit key of a client address
pub fn identifier_from_ip(ip: IpAddr) -> String {
    ip.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_A: &str = "198.51.100.1";
    const CLIENT_B: &str = "198.51.100.2";

    fn limiter(windows: Vec<RateWindow>) -> RateLimiter {
        RateLimiter::with_config(RateLimitConfig { windows })
    }

    fn millis(max_requests: usize, window: u64) -> RateWindow {
        RateWindow {
            max_requests,
            window_duration: Duration::from_millis(window),
        }
    }

    #[tokio::test]
    async fn test_creates_beyond_minute_quota_are_rejected() {
        let limiter = limiter(vec![RateWindow::per_minute(3)]);

        for _ in 0..3 {
            limiter.check_rate_limit(CLIENT_A).await.unwrap();
        }

        let err = limiter.check_rate_limit(CLIENT_A).await.unwrap_err();
        assert!(matches!(err, AppError::RateLimited { .. }));
        assert!(err.to_string().contains("3 requests per 60 seconds"));
    }

    #[tokio::test]
    async fn test_default_quota_is_twenty_per_minute() {
        let limiter = RateLimiter::new();
        assert_eq!(
            limiter.config().windows,
            vec![RateWindow::per_minute(20), RateWindow::per_hour(500)]
        );

        for _ in 0..20 {
            limiter.check_rate_limit(CLIENT_A).await.unwrap();
        }
        assert!(limiter.check_rate_limit(CLIENT_A).await.is_err());
        assert!(limiter.check_rate_limit(CLIENT_B).await.is_ok());
    }

    #[tokio::test]
    async fn test_clients_are_counted_separately() {
        let limiter = limiter(vec![RateWindow::per_minute(1)]);

        limiter.check_rate_limit(CLIENT_A).await.unwrap();
        limiter.check_rate_limit(CLIENT_B).await.unwrap();

        assert!(limiter.check_rate_limit(CLIENT_A).await.is_err());
        assert!(limiter.check_rate_limit(CLIENT_B).await.is_err());
    }

    #[tokio::test]
    async fn test_every_window_must_have_room() {
        // A burst window that refills quickly inside a tighter long window
        let limiter = limiter(vec![millis(2, 100), RateWindow::per_minute(3)]);

        limiter.check_rate_limit(CLIENT_A).await.unwrap();
        limiter.check_rate_limit(CLIENT_A).await.unwrap();
        assert!(limiter.check_rate_limit(CLIENT_A).await.is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;

        // The burst window has room again, the minute window takes one more
        limiter.check_rate_limit(CLIENT_A).await.unwrap();
        let err = limiter.check_rate_limit(CLIENT_A).await.unwrap_err();
        assert!(err.to_string().contains("3 requests per 60 seconds"));
    }

    #[tokio::test]
    async fn test_rejections_do_not_extend_the_block() {
        let limiter = limiter(vec![millis(1, 300)]);

        limiter.check_rate_limit(CLIENT_A).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        for _ in 0..5 {
            assert!(limiter.check_rate_limit(CLIENT_A).await.is_err());
        }

        // Only the accepted request counts, and it has left the window by now
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.check_rate_limit(CLIENT_A).await.is_ok());
    }

    #[tokio::test]
    async fn test_retry_after_counts_down_from_window() {
        let limiter = limiter(vec![RateWindow::per_hour(1)]);
        limiter.check_rate_limit(CLIENT_A).await.unwrap();

        let err = limiter.check_rate_limit(CLIENT_A).await.unwrap_err();
        let retry_after = err.retry_after().unwrap();
        assert!(retry_after > 3500 && retry_after <= 3600, "retry_after = {}", retry_after);
    }

    #[tokio::test]
    async fn test_idle_clients_are_pruned() {
        let limiter = limiter(vec![millis(5, 100)]);

        for client in ["192.0.2.1", "192.0.2.2", "192.0.2.3"] {
            limiter.check_rate_limit(client).await.unwrap();
        }
        assert_eq!(limiter.cleanup_expired().await, 0);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(limiter.cleanup_expired().await, 3);
    }

    #[tokio::test]
    async fn test_concurrent_checks_respect_limit() {
        let limiter = limiter(vec![RateWindow::per_minute(10)]);

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check_rate_limit(CLIENT_A).await.is_ok() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[test]
    fn test_identifier_from_ip() {
        assert_eq!(identifier_from_ip("2001:db8::1".parse().unwrap()), "2001:db8::1");
    }
}
