//! Environment-driven configuration.
//!
//! Values come from the process environment (after loading `.env` if one is
//! present). Every setting has a default so a bare environment works offline.

use crate::districts::cache::JsonFileStore;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.geocod.io/v1.7";

/// Settings for the resolver, its provider and batch runs.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// Unit for retry backoff (linear on network errors, exponential on 429).
    pub retry_base_delay: Duration,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub cache_ttl: Duration,
    /// How old an expired cache entry may be and still serve as a fallback.
    pub stale_max_age: Duration,
    pub delay_between_batches: Duration,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub cache_path: PathBuf,
    pub telemetry: TelemetryConfig,
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            batch_size: 50,
            max_concurrency: 5,
            cache_ttl: Duration::from_secs(30 * 24 * 3600),
            stale_max_age: Duration::from_secs(90 * 24 * 3600),
            delay_between_batches: Duration::from_secs(1),
            rate_limit_requests: 1000,
            rate_limit_window: Duration::from_secs(60),
            cache_path: JsonFileStore::default_path(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl GeocoderConfig {
    /// Load `.env` (if present) and read `CIVIC_*` variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let ms = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse_var::<u64>(&lookup, var)?.map_or(default, Duration::from_millis))
        };
        let hours = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match parse_var::<u64>(&lookup, var)? {
                None => Ok(default),
                Some(h) => h.checked_mul(3600).map(Duration::from_secs).ok_or_else(|| {
                    ConfigError::Invalid {
                        var,
                        value: h.to_string(),
                    }
                }),
            }
        };

        let config = Self {
            api_key: lookup("CIVIC_GEOCODER_API_KEY").unwrap_or(d.api_key),
            base_url: lookup("CIVIC_GEOCODER_BASE_URL").unwrap_or(d.base_url),
            request_timeout: ms("CIVIC_REQUEST_TIMEOUT_MS", d.request_timeout)?,
            max_retries: parse_var(&lookup, "CIVIC_MAX_RETRIES")?.unwrap_or(d.max_retries),
            retry_base_delay: ms("CIVIC_RETRY_BASE_DELAY_MS", d.retry_base_delay)?,
            batch_size: parse_var(&lookup, "CIVIC_BATCH_SIZE")?.unwrap_or(d.batch_size),
            max_concurrency: parse_var(&lookup, "CIVIC_MAX_CONCURRENCY")?
                .unwrap_or(d.max_concurrency),
            cache_ttl: hours("CIVIC_CACHE_TTL_HOURS", d.cache_ttl)?,
            stale_max_age: hours("CIVIC_STALE_MAX_AGE_HOURS", d.stale_max_age)?,
            delay_between_batches: ms("CIVIC_BATCH_DELAY_MS", d.delay_between_batches)?,
            rate_limit_requests: parse_var(&lookup, "CIVIC_RATE_LIMIT_REQUESTS")?
                .unwrap_or(d.rate_limit_requests),
            rate_limit_window: ms("CIVIC_RATE_LIMIT_WINDOW_MS", d.rate_limit_window)?,
            cache_path: lookup("CIVIC_CACHE_PATH").map(PathBuf::from).unwrap_or(d.cache_path),
            telemetry: TelemetryConfig {
                log_level: lookup("CIVIC_LOG_LEVEL").unwrap_or(d.telemetry.log_level),
            },
        };

        if config.batch_size == 0 {
            return Err(ConfigError::Invalid {
                var: "CIVIC_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        if config.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "CIVIC_MAX_CONCURRENCY",
                value: "0".to_string(),
            });
        }
        Ok(config)
    }

    /// Fail if the HTTP provider cannot authenticate.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        if self.api_key.trim().is_empty() {
            Err(ConfigError::Missing("CIVIC_GEOCODER_API_KEY"))
        } else {
            Ok(&self.api_key)
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}
