//! Deterministic cache keys for synthesis requests

use sha2::{Digest, Sha256};

use super::request::SynthesisRequest;

/// Prefix shared by every audio cache key
pub const KEY_PREFIX: &str = "tts:";

/// Derive the cache key for a request
///
/// The key is a SHA-256 digest of the normalized tuple (trimmed text,
/// language, voice, format, rate to 2 decimals, pitch and gain to 1 decimal,
/// SSML flag). Fields are separated by a unit separator so adjacent values
/// cannot run together. Cache and priority flags do not affect the key.
#[must_use]
pub fn cache_key(request: &SynthesisRequest) -> String {
    let normalized = [
        request.text.trim().to_string(),
        request.language_code.clone(),
        request.voice_id.clone(),
        request.audio_format.as_str().to_string(),
        format!("{:.2}", request.speaking_rate),
        format!("{:.1}", request.pitch),
        format!("{:.1}", request.volume_gain_db),
        request.ssml.to_string(),
    ]
    .join("\u{1f}");

    let digest = Sha256::digest(normalized.as_bytes());
    format!("{KEY_PREFIX}{}", hex::encode(digest))
}
