//! Voice catalog, quality tiers and pricing

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Price per million characters for standard voices (USD)
pub const STANDARD_PRICE_PER_MILLION: f64 = 4.0;

/// Price per million characters for every higher tier (USD)
pub const PREMIUM_PRICE_PER_MILLION: f64 = 16.0;

/// Quality class of a synthesis voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceTier {
    #[default]
    Standard,
    Wavenet,
    Neural2,
    Journey,
    Studio,
}

impl VoiceTier {
    /// Infer the tier from markers in a voice name such as `en-US-Neural2-C`
    #[must_use]
    pub fn from_voice_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("studio") {
            Self::Studio
        } else if lower.contains("journey") || lower.contains("chirp") {
            Self::Journey
        } else if lower.contains("neural2") {
            Self::Neural2
        } else if lower.contains("wavenet") {
            Self::Wavenet
        } else {
            Self::Standard
        }
    }

    /// Ordering key, higher is better
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Standard => 0,
            Self::Wavenet => 1,
            Self::Neural2 => 2,
            Self::Journey => 3,
            Self::Studio => 4,
        }
    }

    /// Price per million characters (USD)
    #[must_use]
    pub const fn price_per_million(self) -> f64 {
        match self {
            Self::Standard => STANDARD_PRICE_PER_MILLION,
            _ => PREMIUM_PRICE_PER_MILLION,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Wavenet => "wavenet",
            Self::Neural2 => "neural2",
            Self::Journey => "journey",
            Self::Studio => "studio",
        }
    }
}

impl fmt::Display for VoiceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoiceTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "wavenet" => Ok(Self::Wavenet),
            "neural2" | "neural" => Ok(Self::Neural2),
            "journey" | "chirp" => Ok(Self::Journey),
            "studio" => Ok(Self::Studio),
            other => Err(Error::Validation(format!("unknown voice tier: {other}"))),
        }
    }
}

/// Estimated cost in USD for `characters` at `tier`, rounded to 5 decimals
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cost_for(characters: usize, tier: VoiceTier) -> f64 {
    let raw = characters as f64 / 1_000_000.0 * tier.price_per_million();
    (raw * 100_000.0).round() / 100_000.0
}

/// Voice gender as reported by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceGender {
    Male,
    Female,
    Neutral,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl FromStr for VoiceGender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "neutral" => Ok(Self::Neutral),
            other => Err(Error::Validation(format!("unknown voice gender: {other}"))),
        }
    }
}

/// A synthesis voice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub language_codes: Vec<String>,
    pub gender: VoiceGender,
    pub natural_sample_rate_hz: u32,
    pub tier: VoiceTier,
}

impl Voice {
    /// Build a voice, inferring its tier from the name
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        language_codes: Vec<String>,
        gender: VoiceGender,
        natural_sample_rate_hz: u32,
    ) -> Self {
        let name = name.into();
        let tier = VoiceTier::from_voice_name(&name);
        Self {
            name,
            language_codes,
            gender,
            natural_sample_rate_hz,
            tier,
        }
    }

    /// Whether the voice speaks `language_code`
    #[must_use]
    pub fn supports(&self, language_code: &str) -> bool {
        self.language_codes
            .iter()
            .any(|code| code.eq_ignore_ascii_case(language_code))
    }
}

/// Catalog filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceFilter {
    pub language_code: Option<String>,
    pub tier: Option<VoiceTier>,
    pub gender: Option<VoiceGender>,
}

impl VoiceFilter {
    #[must_use]
    pub fn matches(&self, voice: &Voice) -> bool {
        self.language_code
            .as_deref()
            .is_none_or(|code| voice.supports(code))
            && self.tier.is_none_or(|tier| voice.tier == tier)
            && self.gender.is_none_or(|gender| voice.gender == gender)
    }
}

/// Sort best tier first, then by name for a stable listing
pub fn sort_by_tier(voices: &mut [Voice]) {
    voices.sort_by(|a, b| {
        b.tier
            .rank()
            .cmp(&a.tier.rank())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Static voices per language, used when the catalog cannot be fetched
const FALLBACK_VOICES: &[(&str, &[(&str, VoiceGender)])] = &[
    (
        "en-US",
        &[
            ("en-US-Neural2-C", VoiceGender::Female),
            ("en-US-Neural2-D", VoiceGender::Male),
            ("en-US-Wavenet-F", VoiceGender::Female),
            ("en-US-Standard-C", VoiceGender::Female),
            ("en-US-Standard-B", VoiceGender::Male),
        ],
    ),
    (
        "en-GB",
        &[
            ("en-GB-Neural2-A", VoiceGender::Female),
            ("en-GB-Wavenet-B", VoiceGender::Male),
            ("en-GB-Standard-A", VoiceGender::Female),
        ],
    ),
    (
        "es-ES",
        &[
            ("es-ES-Neural2-A", VoiceGender::Female),
            ("es-ES-Wavenet-B", VoiceGender::Male),
            ("es-ES-Standard-A", VoiceGender::Female),
        ],
    ),
    (
        "fr-FR",
        &[
            ("fr-FR-Neural2-A", VoiceGender::Female),
            ("fr-FR-Wavenet-B", VoiceGender::Male),
            ("fr-FR-Standard-A", VoiceGender::Female),
        ],
    ),
    (
        "de-DE",
        &[
            ("de-DE-Neural2-B", VoiceGender::Male),
            ("de-DE-Wavenet-A", VoiceGender::Female),
            ("de-DE-Standard-A", VoiceGender::Female),
        ],
    ),
    (
        "it-IT",
        &[
            ("it-IT-Neural2-A", VoiceGender::Female),
            ("it-IT-Standard-C", VoiceGender::Male),
        ],
    ),
    (
        "ja-JP",
        &[
            ("ja-JP-Neural2-B", VoiceGender::Female),
            ("ja-JP-Wavenet-C", VoiceGender::Male),
            ("ja-JP-Standard-A", VoiceGender::Female),
        ],
    ),
    (
        "pt-BR",
        &[
            ("pt-BR-Neural2-A", VoiceGender::Female),
            ("pt-BR-Standard-B", VoiceGender::Male),
        ],
    ),
];

/// Fallback voices for one language, best tier first; empty if unknown
#[must_use]
pub fn fallback_voices(language_code: &str) -> Vec<Voice> {
    let mut voices: Vec<Voice> = FALLBACK_VOICES
        .iter()
        .filter(|(code, _)| code.eq_ignore_ascii_case(language_code))
        .flat_map(|(code, entries)| {
            entries
                .iter()
                .map(move |(name, gender)| {
                    Voice::new(*name, vec![(*code).to_string()], *gender, 24_000)
                })
        })
        .collect();
    sort_by_tier(&mut voices);
    voices
}

/// Every fallback voice across all languages, best tier first
#[must_use]
pub fn all_fallback_voices() -> Vec<Voice> {
    let mut voices: Vec<Voice> = FALLBACK_VOICES
        .iter()
        .flat_map(|(code, _)| fallback_voices(code))
        .collect();
    sort_by_tier(&mut voices);
    voices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_tier_from_name() {
        assert_eq!(VoiceTier::from_voice_name("en-US-Standard-C"), VoiceTier::Standard);
        assert_eq!(VoiceTier::from_voice_name("en-US-Wavenet-D"), VoiceTier::Wavenet);
        assert_eq!(VoiceTier::from_voice_name("en-US-Neural2-F"), VoiceTier::Neural2);
        assert_eq!(VoiceTier::from_voice_name("en-US-Journey-O"), VoiceTier::Journey);
        assert_eq!(VoiceTier::from_voice_name("en-US-Chirp-HD-D"), VoiceTier::Journey);
        assert_eq!(VoiceTier::from_voice_name("en-US-Studio-O"), VoiceTier::Studio);
        assert_eq!(VoiceTier::from_voice_name("cached"), VoiceTier::Standard);
    }

    #[test]
    fn estimate_for_hello() {
        assert!((cost_for(5, VoiceTier::Standard) - 0.00002).abs() < 1e-12);
        assert!((cost_for(5, VoiceTier::Neural2) - 0.00008).abs() < 1e-12);
    }

    #[test]
    fn cost_rounds_to_five_decimals() {
        // 1 char standard = 0.000004, rounds to 0.0
        assert!(cost_for(1, VoiceTier::Standard).abs() < f64::EPSILON);
        assert!((cost_for(1_000_000, VoiceTier::Studio) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn sorts_best_tier_first() {
        let mut voices = fallback_voices("en-US");
        sort_by_tier(&mut voices);
        let tiers: Vec<_> = voices.iter().map(|v| v.tier).collect();
        assert_eq!(tiers.first(), Some(&VoiceTier::Neural2));
        assert_eq!(tiers.last(), Some(&VoiceTier::Standard));
        assert!(tiers.windows(2).all(|w| w[0].rank() >= w[1].rank()));
    }

    #[test]
    fn fallback_for_unknown_language_is_empty() {
        assert!(fallback_voices("xx-XX").is_empty());
        assert!(!fallback_voices("ja-JP").is_empty());
    }

    #[test]
    fn filter_matches_fields() {
        let voice = Voice::new(
            "en-GB-Wavenet-B",
            vec!["en-GB".to_string()],
            VoiceGender::Male,
            24_000,
        );

        assert!(VoiceFilter::default().matches(&voice));
        assert!(VoiceFilter {
            language_code: Some("en-gb".to_string()),
            tier: Some(VoiceTier::Wavenet),
            gender: Some(VoiceGender::Male),
        }
        .matches(&voice));
        assert!(!VoiceFilter {
            tier: Some(VoiceTier::Standard),
            ..VoiceFilter::default()
        }
        .matches(&voice));
        assert!(!VoiceFilter {
            language_code: Some("en-US".to_string()),
            ..VoiceFilter::default()
        }
        .matches(&voice));
    }

    #[test]
    fn gender_deserializes_unknown_as_unspecified() {
        let g: VoiceGender = serde_json::from_str("\"SSML_VOICE_GENDER_UNSPECIFIED\"").unwrap();
        assert_eq!(g, VoiceGender::Unspecified);
        let g: VoiceGender = serde_json::from_str("\"FEMALE\"").unwrap();
        assert_eq!(g, VoiceGender::Female);
    }
}
