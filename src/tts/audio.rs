//! Playable audio and its metadata

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Encoded audio formats the backend can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioFormat {
    /// MPEG layer III
    #[default]
    Mp3,
    /// 16-bit signed little-endian PCM in a WAV container
    Linear16,
    /// Opus in an Ogg container
    OggOpus,
}

impl AudioFormat {
    /// Backend encoding identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "MP3",
            Self::Linear16 => "LINEAR16",
            Self::OggOpus => "OGG_OPUS",
        }
    }

    /// MIME type of the encoded payload
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Linear16 => "audio/wav",
            Self::OggOpus => "audio/ogg",
        }
    }

    /// Conventional file extension
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Linear16 => "wav",
            Self::OggOpus => "ogg",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MP3" => Ok(Self::Mp3),
            "LINEAR16" | "WAV" => Ok(Self::Linear16),
            "OGG_OPUS" | "OGG" => Ok(Self::OggOpus),
            other => Err(Error::Validation(format!("unsupported audio format: {other}"))),
        }
    }
}

/// Encoded audio ready for playback
///
/// The payload is shared, so clones handed out by the cache are cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioClip {
    data: Arc<[u8]>,
    format: AudioFormat,
}

impl AudioClip {
    /// Wrap an encoded payload
    #[must_use]
    pub fn new(data: impl Into<Arc<[u8]>>, format: AudioFormat) -> Self {
        Self {
            data: data.into(),
            format,
        }
    }

    /// Encoded bytes
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Encoding of the payload
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Payload size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioClip")
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Playback metadata reported by the probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    /// Duration in seconds
    pub duration_secs: f64,
    /// Encoding of the payload
    pub format: AudioFormat,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bit rate in bits per second
    pub bit_rate: u32,
    /// Channel count
    pub channels: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_identifiers() {
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!("linear16".parse::<AudioFormat>().unwrap(), AudioFormat::Linear16);
        assert_eq!("OGG_OPUS".parse::<AudioFormat>().unwrap(), AudioFormat::OggOpus);
    }

    #[test]
    fn rejects_unsupported_format() {
        let err = "FLAC".parse::<AudioFormat>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn serde_uses_backend_identifiers() {
        assert_eq!(
            serde_json::to_string(&AudioFormat::OggOpus).unwrap(),
            "\"OGG_OPUS\""
        );
        let parsed: AudioFormat = serde_json::from_str("\"LINEAR16\"").unwrap();
        assert_eq!(parsed, AudioFormat::Linear16);
    }

    #[test]
    fn clip_clones_share_payload() {
        let clip = AudioClip::new(vec![1u8, 2, 3], AudioFormat::Mp3);
        let copy = clip.clone();
        assert_eq!(copy.bytes(), &[1, 2, 3]);
        assert_eq!(copy.len(), 3);
        assert!(std::ptr::eq(clip.bytes(), copy.bytes()));
    }
}
