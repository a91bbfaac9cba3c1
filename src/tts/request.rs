//! Synthesis request and response types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audio::{AudioClip, AudioFormat, AudioMetadata};
use crate::Error;

/// Scheduling hint attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(Error::Validation(format!("invalid priority: {other}"))),
        }
    }
}

/// A single text-to-speech request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisRequest {
    /// Text or SSML document to speak
    pub text: String,
    /// BCP-47 language code (e.g. "en-US")
    pub language_code: String,
    /// Backend voice identifier (e.g. "en-US-Neural2-C")
    pub voice_id: String,
    /// Output encoding
    pub audio_format: AudioFormat,
    /// Speaking rate multiplier, 0.25 to 4.0
    pub speaking_rate: f64,
    /// Pitch shift in semitones, -20 to 20
    pub pitch: f64,
    /// Volume gain in dB, -96 to 16
    pub volume_gain_db: f64,
    /// `text` is an SSML document
    pub ssml: bool,
    /// Allow serving from and storing into the audio cache
    pub use_cache: bool,
    /// Scheduling hint
    pub priority: Priority,
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            text: String::new(),
            language_code: "en-US".to_string(),
            voice_id: "en-US-Standard-C".to_string(),
            audio_format: AudioFormat::Mp3,
            speaking_rate: 1.0,
            pitch: 0.0,
            volume_gain_db: 0.0,
            ssml: false,
            use_cache: true,
            priority: Priority::Normal,
        }
    }
}

impl SynthesisRequest {
    /// Request with default voice settings
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_voice(
        mut self,
        language_code: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> Self {
        self.language_code = language_code.into();
        self.voice_id = voice_id.into();
        self
    }

    #[must_use]
    pub const fn with_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = format;
        self
    }

    #[must_use]
    pub const fn with_speaking_rate(mut self, rate: f64) -> Self {
        self.speaking_rate = rate;
        self
    }

    #[must_use]
    pub const fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = pitch;
        self
    }

    #[must_use]
    pub const fn with_volume_gain_db(mut self, gain: f64) -> Self {
        self.volume_gain_db = gain;
        self
    }

    /// Mark the text as an SSML document
    #[must_use]
    pub const fn with_ssml(mut self, ssml: bool) -> Self {
        self.ssml = ssml;
        self
    }

    #[must_use]
    pub const fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Billable characters (Unicode scalar values)
    #[must_use]
    pub fn character_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Per-request bookkeeping returned with every response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestAnalytics {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub character_count: usize,
    pub cache_hit: bool,
}

/// Result of a completed synthesis
#[derive(Debug, Clone)]
pub struct SynthesisResponse {
    /// Playable audio
    pub audio: AudioClip,
    /// Cost in USD; zero for cache hits
    pub cost: f64,
    /// Served from the audio cache
    pub cached: bool,
    /// Voice name reported by the backend, or "cached"
    pub voice_name: String,
    /// Wall time spent inside `synthesize`
    pub processing_time: std::time::Duration,
    /// Playback metadata
    pub metadata: AudioMetadata,
    pub analytics: RequestAnalytics,
}
