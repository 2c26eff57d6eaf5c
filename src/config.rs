use std::str::FromStr;
use std::time::Duration;

/// Job service address used when `SCRAPER_API_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Shortest poll interval the controller will run with.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Largest record count a single job may request.
pub const DEFAULT_MAX_DESIRED_COUNT: u32 = 1000;

/// Configuration for the job client.
///
/// Use [`ClientConfig::from_env()`] in applications, or
/// [`ClientConfig::builder()`] when wiring things up by hand.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the job service, without a trailing slash.
    pub base_url: String,

    /// Delay between status polls. Values below [`MIN_POLL_INTERVAL`] are
    /// raised to it.
    pub poll_interval: Duration,

    /// Consecutive failed polls tolerated before the job is declared failed.
    pub max_consecutive_failures: u32,

    /// Per-request timeout for both endpoints.
    pub request_timeout: Duration,

    /// Upper bound enforced on the requested record count.
    pub max_desired_count: u32,

    /// Status fetches allowed in flight at once; extra ticks are skipped.
    pub max_in_flight: usize,

    /// Idle snapshots accepted before the job is first seen running.
    pub startup_grace_polls: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_millis(1000),
            max_consecutive_failures: 5,
            request_timeout: Duration::from_secs(10),
            max_desired_count: DEFAULT_MAX_DESIRED_COUNT,
            max_in_flight: 4,
            startup_grace_polls: 5,
        }
    }
}

impl ClientConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load configuration from the environment (and a `.env` file if present).
    ///
    /// | Env Var                        | Default                  |
    /// |--------------------------------|--------------------------|
    /// | `SCRAPER_API_BASE_URL`         | `http://localhost:5000`  |
    /// | `SCRAPER_POLL_INTERVAL_MS`     | `1000`                   |
    /// | `SCRAPER_MAX_POLL_FAILURES`    | `5`                      |
    /// | `SCRAPER_REQUEST_TIMEOUT_SECS` | `10`                     |
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let base_url = std::env::var("SCRAPER_API_BASE_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(normalize_base_url)
            .unwrap_or(defaults.base_url);

        let poll_ms: u64 = env_or("SCRAPER_POLL_INTERVAL_MS", 1000);
        let max_failures: u32 = env_or(
            "SCRAPER_MAX_POLL_FAILURES",
            defaults.max_consecutive_failures,
        );
        let timeout_secs: u64 = env_or("SCRAPER_REQUEST_TIMEOUT_SECS", 10);

        Self {
            base_url,
            poll_interval: Duration::from_millis(poll_ms).max(MIN_POLL_INTERVAL),
            max_consecutive_failures: max_failures.max(1),
            request_timeout: Duration::from_secs(timeout_secs),
            ..defaults
        }
    }
}

fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, %default, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

pub(crate) fn normalize_base_url(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}

/// Builder for [`ClientConfig`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the job service base URL. Trailing slashes are stripped.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = normalize_base_url(url);
        self
    }

    /// Set the delay between status polls. Clamped to at least 1ms.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Set how many failed polls in a row end the job. Clamped to at least 1.
    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.config.max_consecutive_failures = max.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn with_max_desired_count(mut self, max: u32) -> Self {
        self.config.max_desired_count = max;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.config.max_in_flight = max.max(1);
        self
    }

    pub fn with_startup_grace_polls(mut self, polls: u32) -> Self {
        self.config.startup_grace_polls = polls;
        self
    }

    /// Build the final [`ClientConfig`].
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.max_desired_count, 1000);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .with_base_url("https://scraper.example.com///")
            .with_poll_interval(Duration::from_millis(250))
            .with_max_consecutive_failures(0)
            .with_max_in_flight(0)
            .build();
        assert_eq!(config.base_url, "https://scraper.example.com");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_consecutive_failures, 1);
        assert_eq!(config.max_in_flight, 1);
    }

    #[test]
    fn test_builder_clamps_zero_poll_interval() {
        let config = ClientConfig::builder()
            .with_poll_interval(Duration::ZERO)
            .build();
        assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://localhost:5000/"), "http://localhost:5000");
        assert_eq!(normalize_base_url("http://localhost:5000"), "http://localhost:5000");
    }
}
