//! # Configuration Module
//!
//! Client-wide configuration (loaded once at startup) and per-request
//! configuration (passed with each call).
//!
//! ## Key Features
//! - YAML/JSON/TOML configuration parsing with serde
//! - Human-readable durations (`"10s"`, `"300ms"`) via `humantime-serde`
//! - Environment variable override support
//! - Validation with detailed error messages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::caching::store::CacheConfig;
use crate::core::error::{ClientError, ClientResult};
use crate::observability::config::LogConfig;
use crate::traffic::retry::RetryConfig;

/// Default per-attempt transport timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative endpoints are joined onto
    pub base_url: Option<String>,

    /// Default timeout for each transport attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Collapse concurrent identical requests by default
    pub deduplicate: bool,

    /// Headers added to every request
    pub default_headers: HashMap<String, String>,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Retry policy defaults
    pub retry: RetryConfig,

    /// Logging settings used by the binary
    pub logging: LogConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            deduplicate: true,
            default_headers: HashMap::new(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML, JSON or TOML file, picked by extension
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> ClientResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::config(format!("Failed to read config file: {}", e)))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut config = Self::parse(&content, &extension)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text in the given format (`yaml`, `yml`, `json`, `toml`)
    pub fn parse(content: &str, format: &str) -> ClientResult<Self> {
        let config = match format {
            "yaml" | "yml" => serde_yaml::from_str(content)?,
            "json" => serde_json::from_str(content)
                .map_err(|e| ClientError::config(format!("Failed to parse JSON config: {}", e)))?,
            "toml" => toml::from_str(content)?,
            other => {
                return Err(ClientError::config(format!(
                    "Unsupported config format: {:?}",
                    other
                )))
            }
        };
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern: CLIENT_<FIELD>
    /// For example: CLIENT_TIMEOUT=5s
    pub fn apply_env_overrides(&mut self) -> ClientResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ClientResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CLIENT_BASE_URL") {
            self.base_url = Some(url);
        }

        if let Some(timeout) = lookup("CLIENT_TIMEOUT") {
            self.timeout = parse_duration("CLIENT_TIMEOUT", &timeout)?;
        }

        if let Some(retries) = lookup("CLIENT_MAX_RETRIES") {
            self.retry.max_retries = retries
                .parse()
                .map_err(|e| ClientError::config(format!("Invalid CLIENT_MAX_RETRIES: {}", e)))?;
        }

        if let Some(delay) = lookup("CLIENT_RETRY_DELAY") {
            self.retry.retry_delay = parse_duration("CLIENT_RETRY_DELAY", &delay)?;
        }

        if let Some(ttl) = lookup("CLIENT_CACHE_TTL") {
            self.cache.default_ttl = parse_duration("CLIENT_CACHE_TTL", &ttl)?;
        }

        if let Some(level) = lookup("CLIENT_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ClientResult<()> {
        if let Some(base_url) = &self.base_url {
            url::Url::parse(base_url)
                .map_err(|e| ClientError::config(format!("Invalid base_url {:?}: {}", base_url, e)))?;
        }

        if self.timeout.is_zero() {
            return Err(ClientError::config("timeout must be greater than zero"));
        }

        if self.cache.default_ttl.is_zero() {
            return Err(ClientError::config("cache.default_ttl must be greater than zero"));
        }

        if self.cache.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ClientError::config("cache.sweep_interval must be greater than zero"));
        }

        if self.cache.max_key_length < 32 {
            return Err(ClientError::config("cache.max_key_length must be at least 32"));
        }

        if self.retry.max_delay < self.retry.retry_delay {
            return Err(ClientError::config(
                "retry.max_delay must not be smaller than retry.retry_delay",
            ));
        }

        Ok(())
    }
}

fn parse_duration(name: &str, value: &str) -> ClientResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ClientError::config(format!("Invalid {}: {}", name, e)))
}

/// Caller-supplied predicate that replaces the default retry decision
#[derive(Clone)]
pub struct RetryCondition(Arc<dyn Fn(&ClientError) -> bool + Send + Sync>);

impl RetryCondition {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&ClientError) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    pub fn should_retry(&self, error: &ClientError) -> bool {
        (self.0)(error)
    }
}

impl fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryCondition(..)")
    }
}

/// Per-request retry overrides; unset fields fall back to `ClientConfig::retry`
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub retry_condition: Option<RetryCondition>,
}

/// Per-request configuration
///
/// Every field is optional; `None` means "use the client or verb default".
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Cache the response (defaults to true for GET, false for writes)
    pub cache: Option<bool>,

    /// How long a cached response stays valid
    pub cache_ttl: Option<Duration>,

    /// Tags attached to the cached response for group invalidation
    pub cache_tags: Vec<String>,

    pub retry: RetryOptions,

    /// Deadline for each transport attempt
    pub timeout: Option<Duration>,

    /// Share one execution between concurrent identical requests
    pub deduplicate: Option<bool>,

    /// Extra headers for this request only
    pub headers: HashMap<String, String>,

    /// Token the caller can cancel to abort the whole logical request
    pub cancel_token: Option<CancellationToken>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = Some(enabled);
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn cache_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.retry_delay = Some(delay);
        self
    }

    pub fn retry_condition<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClientError) -> bool + Send + Sync + 'static,
    {
        self.retry.retry_condition = Some(RetryCondition::new(predicate));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn deduplicate(mut self, enabled: bool) -> Self {
        self.deduplicate = Some(enabled);
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}
