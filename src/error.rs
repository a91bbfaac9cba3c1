//! Error types for the TTS gateway

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for TTS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure classification used for retry decisions and caller-side handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Request failed local validation
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    /// Credential missing, expired or rejected
    #[serde(rename = "AUTHENTICATION_ERROR")]
    Authentication,
    /// Backend quota or request rate exceeded
    #[serde(rename = "RATE_LIMIT_ERROR")]
    RateLimit,
    /// Backend temporarily unavailable
    ServiceUnavailable,
    /// Transport failure or attempt timeout
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    /// Backend rejected the request
    #[serde(rename = "API_ERROR")]
    Api,
    /// Anything not otherwise classified
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorKind {
    /// Whether a failure of this class is worth another attempt
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::ServiceUnavailable | Self::Network | Self::Unknown
        )
    }

    /// Fixed delay to wait before retrying, when the class prescribes one
    ///
    /// Classes without a fixed delay fall back to exponential backoff.
    #[must_use]
    pub const fn suggested_delay(self) -> Option<Duration> {
        match self {
            Self::RateLimit => Some(Duration::from_secs(60)),
            Self::ServiceUnavailable => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    /// Stable identifier, e.g. `RATE_LIMIT_ERROR`
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::RateLimit => "RATE_LIMIT_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Network => "NETWORK_ERROR",
            Self::Api => "API_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing synthesis failure
///
/// Carries the classification of the underlying failure so callers can
/// decide programmatically whether and when to try again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("speech synthesis failed ({kind}): {message}")]
pub struct SynthesisError {
    /// Classification of the underlying failure
    pub kind: ErrorKind,
    /// Human-readable description
    pub message: String,
    /// Whether the caller may retry
    pub retryable: bool,
    /// Suggested wait before retrying
    pub retry_after: Option<Duration>,
}

impl SynthesisError {
    /// Wrap an arbitrary crate error, keeping its classification
    #[must_use]
    pub fn wrap(error: &Error) -> Self {
        let kind = error.kind();
        Self {
            kind,
            message: error.to_string(),
            retryable: kind.is_retryable(),
            retry_after: error.retry_after().or_else(|| kind.suggested_delay()),
        }
    }
}

/// Errors that can occur in the TTS gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Request validation error
    #[error("invalid request: {0}")]
    Validation(String),

    /// Error reported by the speech backend, classified at the point of detection
    #[error("backend error ({kind}): {message}")]
    Backend {
        /// Classification of the failure
        kind: ErrorKind,
        /// Backend or transport message
        message: String,
        /// Delay requested by the backend, if any
        retry_after: Option<Duration>,
    },

    /// A single backend attempt exceeded its time budget
    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),

    /// Audio decoding or inspection error
    #[error("audio error: {0}")]
    Audio(String),

    /// Playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Persistence error
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Instance was torn down
    #[error("synthesis service has been destroyed")]
    Destroyed,

    /// Synthesis-level failure surfaced to callers
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a classified backend failure
    pub fn backend(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Backend {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Classification of this failure
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::Backend { kind, .. } => *kind,
            Self::Synthesis(e) => e.kind,
            Self::Timeout(_) | Self::Http(_) => ErrorKind::Network,
            Self::Audio(_) | Self::Serialization(_) => ErrorKind::Api,
            Self::Playback(_)
            | Self::Persistence(_)
            | Self::Destroyed
            | Self::Io(_)
            | Self::Toml(_) => ErrorKind::Unknown,
        }
    }

    /// Delay explicitly requested alongside the failure
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Backend { retry_after, .. } => *retry_after,
            Self::Synthesis(e) => e.retry_after,
            _ => None,
        }
    }

    /// Whether retrying may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Destroyed => false,
            Self::Synthesis(e) => e.retryable,
            other => other.kind().is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::ServiceUnavailable.is_retryable());
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Unknown.is_retryable());

        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Authentication.is_retryable());
        assert!(!ErrorKind::Api.is_retryable());
    }

    #[test]
    fn suggested_delays() {
        assert_eq!(
            ErrorKind::RateLimit.suggested_delay(),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            ErrorKind::ServiceUnavailable.suggested_delay(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(ErrorKind::Network.suggested_delay(), None);
    }

    #[test]
    fn timeout_is_network() {
        let err = Error::Timeout(Duration::from_secs(30));
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn wrap_keeps_classification() {
        let err = Error::Backend {
            kind: ErrorKind::RateLimit,
            message: "quota exceeded".to_string(),
            retry_after: Some(Duration::from_secs(12)),
        };
        let wrapped = SynthesisError::wrap(&err);

        assert_eq!(wrapped.kind, ErrorKind::RateLimit);
        assert!(wrapped.retryable);
        assert_eq!(wrapped.retry_after, Some(Duration::from_secs(12)));
        assert!(wrapped.to_string().contains("speech synthesis failed"));
        assert!(wrapped.to_string().contains("quota exceeded"));
    }

    #[test]
    fn wrap_validation_is_not_retryable() {
        let wrapped = SynthesisError::wrap(&Error::Validation("text is empty".to_string()));
        assert_eq!(wrapped.kind, ErrorKind::Validation);
        assert!(!wrapped.retryable);
        assert_eq!(wrapped.retry_after, None);
    }

    #[test]
    fn kind_serializes_to_taxonomy_names() {
        let json = serde_json::to_string(&ErrorKind::ServiceUnavailable).unwrap();
        assert_eq!(json, "\"SERVICE_UNAVAILABLE\"");
        let json = serde_json::to_string(&ErrorKind::Network).unwrap();
        assert_eq!(json, "\"NETWORK_ERROR\"");
    }
}
