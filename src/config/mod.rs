//! Configuration management for the TTS gateway

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::tts::{AudioFormat, RetryPolicy};
use crate::{Error, Result};

pub use file::TtsConfigFile;

/// Default Cloud Text-to-Speech REST endpoint
pub const DEFAULT_ENDPOINT: &str = "https://texttospeech.googleapis.com/v1";

/// TTS gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend credential (`GOOGLE_TTS_API_KEY`)
    pub api_key: Option<SecretString>,

    /// Backend REST endpoint base URL
    pub endpoint: String,

    /// Language used when a caller does not pick one
    pub default_language: String,

    /// Voice used when a caller does not pick one
    pub default_voice: String,

    /// Audio format used when a caller does not pick one
    pub default_format: AudioFormat,

    /// Time budget for a single backend attempt
    pub request_timeout: Duration,

    /// Longest accepted text, in characters
    pub max_text_length: usize,

    /// Audio cache budgets
    pub cache: CacheConfig,

    /// Admission control
    pub rate_limit: RateLimitConfig,

    /// Retry policy for backend calls
    pub retry: RetryPolicy,

    /// Usage metrics persistence
    pub metrics: MetricsConfig,
}

/// Audio cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Serve and store cached audio
    pub enabled: bool,

    /// Maximum number of cached entries
    pub max_entries: usize,

    /// Maximum total payload size in bytes
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100,
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Apply admission control
    pub enabled: bool,

    /// Requests admitted per calendar minute
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
        }
    }
}

/// Usage metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Directory holding persisted metrics; `None` keeps metrics in memory
    pub data_dir: Option<PathBuf>,

    /// Interval of the periodic save task
    pub save_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            save_interval: Duration::from_secs(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_language: "en-US".to_string(),
            default_voice: "en-US-Standard-C".to_string(),
            default_format: AudioFormat::Mp3,
            request_timeout: Duration::from_secs(30),
            max_text_length: 5000,
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Return the data directory for persisted state, creating it if needed
///
/// Uses `~/.local/share/omni/beacon-tts/` on Linux
pub fn default_data_dir() -> PathBuf {
    let data_dir = directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/omni/beacon-tts"),
        |d| d.data_dir().join("omni").join("beacon-tts"),
    );

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::warn!(
            path = %data_dir.display(),
            error = %e,
            "failed to create data directory"
        );
    }

    data_dir
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::resolve(fc, |key| std::env::var(key).ok());

        // Persist metrics unless explicitly pointed elsewhere
        let config = if config.metrics.data_dir.is_none() {
            Self {
                metrics: MetricsConfig {
                    data_dir: Some(default_data_dir()),
                    ..config.metrics
                },
                ..config
            }
        } else {
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Merge a parsed config file with environment overrides
    ///
    /// `env` looks up a variable by name; it is a parameter so the layering
    /// can be exercised without touching the process environment.
    pub fn resolve(fc: TtsConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let parse_env = |key: &str| env(key).and_then(|s| s.trim().parse::<u64>().ok());
        let bool_env = |key: &str| env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let api_key = env("GOOGLE_TTS_API_KEY")
            .or(fc.backend.api_key)
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        let default_format = env("BEACON_TTS_FORMAT")
            .or(fc.synthesis.format)
            .and_then(|f| match f.parse::<AudioFormat>() {
                Ok(format) => Some(format),
                Err(e) => {
                    tracing::warn!(format = %f, error = %e, "ignoring unsupported default format");
                    None
                }
            })
            .unwrap_or(default.default_format);

        let cache = CacheConfig {
            enabled: bool_env("BEACON_TTS_CACHE_ENABLED")
                .or(fc.cache.enabled)
                .unwrap_or(default.cache.enabled),
            max_entries: parse_env("BEACON_TTS_CACHE_MAX_ENTRIES")
                .and_then(|v| usize::try_from(v).ok())
                .or(fc.cache.max_entries)
                .unwrap_or(default.cache.max_entries),
            max_bytes: parse_env("BEACON_TTS_CACHE_MAX_BYTES")
                .or(fc.cache.max_bytes)
                .unwrap_or(default.cache.max_bytes),
        };

        let rate_limit = RateLimitConfig {
            enabled: bool_env("BEACON_TTS_RATE_LIMIT_ENABLED")
                .or(fc.rate_limit.enabled)
                .unwrap_or(default.rate_limit.enabled),
            requests_per_minute: parse_env("BEACON_TTS_RATE_LIMIT_RPM")
                .and_then(|v| u32::try_from(v).ok())
                .or(fc.rate_limit.requests_per_minute)
                .unwrap_or(default.rate_limit.requests_per_minute),
        };

        let retry = RetryPolicy {
            max_attempts: parse_env("BEACON_TTS_RETRY_ATTEMPTS")
                .and_then(|v| u32::try_from(v).ok())
                .or(fc.retry.attempts)
                .unwrap_or(default.retry.max_attempts),
            base_delay: parse_env("BEACON_TTS_RETRY_BASE_MS")
                .or(fc.retry.base_delay_ms)
                .map_or(default.retry.base_delay, Duration::from_millis),
            max_delay: fc
                .retry
                .max_delay_ms
                .map_or(default.retry.max_delay, Duration::from_millis),
        };

        let metrics = MetricsConfig {
            data_dir: env("BEACON_TTS_DATA_DIR")
                .or(fc.metrics.data_dir)
                .map(PathBuf::from),
            save_interval: fc
                .metrics
                .save_interval_secs
                .map_or(default.metrics.save_interval, Duration::from_secs),
        };

        Self {
            api_key,
            endpoint: env("BEACON_TTS_ENDPOINT")
                .or(fc.backend.endpoint)
                .unwrap_or(default.endpoint),
            default_language: env("BEACON_TTS_LANGUAGE")
                .or(fc.synthesis.language)
                .unwrap_or(default.default_language),
            default_voice: env("BEACON_TTS_VOICE")
                .or(fc.synthesis.voice)
                .unwrap_or(default.default_voice),
            default_format,
            request_timeout: parse_env("BEACON_TTS_TIMEOUT_MS")
                .or(fc.backend.timeout_ms)
                .map_or(default.request_timeout, Duration::from_millis),
            max_text_length: fc
                .synthesis
                .max_text_length
                .unwrap_or(default.max_text_length),
            cache,
            rate_limit,
            retry,
            metrics,
        }
    }

    /// Check the configuration for values the components cannot work with
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.enabled && self.rate_limit.requests_per_minute == 0 {
            return Err(Error::Config(
                "rate_limit.requests_per_minute must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.attempts must be at least 1".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("backend.timeout_ms must be positive".to_string()));
        }
        if self.max_text_length == 0 {
            return Err(Error::Config(
                "synthesis.max_text_length must be positive".to_string(),
            ));
        }
        if self.metrics.save_interval.is_zero() {
            return Err(Error::Config(
                "metrics.save_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
