//! Beacon TTS - speech synthesis orchestration with an audio cache
//!
//! This library provides:
//! - Request validation and deterministic cache keys
//! - A byte and entry bounded LRU audio cache
//! - Per-minute admission control and classified retries
//! - Usage metrics across session, daily, monthly and lifetime scopes
//! - Single-slot audio playback
//!
//! # Architecture
//!
//! ```text
//! caller ─▶ SynthesisOrchestrator
//!             ├─ RequestValidator
//!             ├─ RateLimiter
//!             ├─ AudioCache ─────────── hit ─▶ response
//!             ├─ RetryExecutor ─▶ SpeechBackend
//!             ├─ UsageMetricsAggregator ─▶ KeyValueStore
//!             └─ AudioPlaybackController ─▶ AudioOutput
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod playback;
pub mod tts;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, ErrorKind, Result, SynthesisError};
pub use metrics::{FileStore, KeyValueStore, MemoryStore, UsageMetrics, UsageMetricsAggregator};
pub use playback::{AudioPlaybackController, PlaybackState, PlaybackStatus, SpeakerOutput};
pub use tts::{
    AudioClip, AudioFormat, GoogleTtsBackend, SpeechBackend, SynthesisOrchestrator,
    SynthesisRequest, SynthesisResponse, VoiceTier,
};
