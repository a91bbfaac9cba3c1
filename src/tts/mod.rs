//! Text-to-speech synthesis pipeline
//!
//! Request model and validation, cache key derivation, the audio cache,
//! admission control, retries, the voice catalog, the backend client and
//! the orchestrator that ties them together.

mod audio;
mod backend;
mod cache;
mod cache_key;
mod orchestrator;
mod probe;
mod rate_limiter;
mod request;
mod retry;
mod validation;
mod voices;

pub use audio::{AudioClip, AudioFormat, AudioMetadata};
pub use backend::{BackendAudio, GoogleTtsBackend, SpeechBackend, classify_status};
pub use cache::{AudioCache, CacheEntry, CacheStats, CachedAudio};
pub use cache_key::{KEY_PREFIX, cache_key};
pub use orchestrator::{CACHED_VOICE_NAME, OrchestratorBuilder, SynthesisOrchestrator};
pub use probe::{AudioProbe, CodecProbe};
pub use rate_limiter::RateLimiter;
pub use request::{Priority, RequestAnalytics, SynthesisRequest, SynthesisResponse};
pub use retry::{RetryExecutor, RetryPolicy};
pub use validation::{
    PITCH_RANGE, RequestValidator, SPEAKING_RATE_RANGE, VOLUME_GAIN_RANGE, validate_ssml,
};
pub use voices::{
    PREMIUM_PRICE_PER_MILLION, STANDARD_PRICE_PER_MILLION, Voice, VoiceFilter, VoiceGender,
    VoiceTier, all_fallback_voices, cost_for, fallback_voices, sort_by_tier,
};
