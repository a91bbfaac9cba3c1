//! TOML configuration file loading
//!
//! Supports `~/.config/omni/beacon-tts/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TtsConfigFile {
    /// Backend connection settings
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Request defaults and limits
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Audio cache budgets
    #[serde(default)]
    pub cache: CacheFileConfig,

    /// Rate limiter settings
    #[serde(default)]
    pub rate_limit: RateLimitFileConfig,

    /// Retry policy
    #[serde(default)]
    pub retry: RetryFileConfig,

    /// Usage metrics persistence
    #[serde(default)]
    pub metrics: MetricsFileConfig,
}

/// Backend connection settings
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// API credential
    pub api_key: Option<String>,
    /// REST endpoint base URL
    pub endpoint: Option<String>,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// Request defaults and limits
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// Default language code (e.g. "en-US")
    pub language: Option<String>,
    /// Default voice id (e.g. "en-US-Neural2-C")
    pub voice: Option<String>,
    /// Default audio format ("MP3", "LINEAR16", "OGG_OPUS")
    pub format: Option<String>,
    /// Maximum text length in characters
    pub max_text_length: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CacheFileConfig {
    pub enabled: Option<bool>,
    pub max_entries: Option<usize>,
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RateLimitFileConfig {
    pub enabled: Option<bool>,
    pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryFileConfig {
    pub attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsFileConfig {
    /// Directory for persisted usage metrics
    pub data_dir: Option<String>,
    /// Periodic save interval in seconds
    pub save_interval_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `TtsConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> TtsConfigFile {
    config_file_path().map_or_else(TtsConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_config_from(path: &Path) -> TtsConfigFile {
    if !path.exists() {
        return TtsConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                TtsConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            TtsConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/beacon-tts/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("beacon-tts")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let fc: TtsConfigFile = toml::from_str(
            r#"
            [cache]
            max_entries = 10

            [rate_limit]
            requests_per_minute = 2
            "#,
        )
        .unwrap();

        assert_eq!(fc.cache.max_entries, Some(10));
        assert_eq!(fc.cache.max_bytes, None);
        assert_eq!(fc.rate_limit.requests_per_minute, Some(2));
        assert!(fc.backend.api_key.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let fc = load_config_from(&dir.path().join("absent.toml"));
        assert!(fc.synthesis.voice.is_none());
    }

    #[test]
    fn unparsable_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let fc = load_config_from(&path);
        assert!(fc.cache.enabled.is_none());
    }
}
