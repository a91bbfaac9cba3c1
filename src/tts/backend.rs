//! Speech synthesis backend
//!
//! [`SpeechBackend`] is the seam the orchestrator calls through;
//! [`GoogleTtsBackend`] talks to the Cloud Text-to-Speech v1 REST surface.
//! Failures are classified here, where the HTTP status is still known.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::request::SynthesisRequest;
use super::voices::{Voice, VoiceGender};
use crate::{Error, ErrorKind, Result};

/// Encoded audio as returned by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAudio {
    /// Base64-encoded audio payload
    pub audio_content: String,
    /// Voice the backend reports having used
    pub voice_name: String,
}

/// Trait for speech synthesis backends
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Synthesize one request
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` classified by failure type
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<BackendAudio>;

    /// List available voices, optionally restricted to one language
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` classified by failure type
    async fn list_voices(&self, language_code: Option<&str>) -> Result<Vec<Voice>>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Cloud Text-to-Speech REST client
pub struct GoogleTtsBackend {
    client: Client,
    endpoint: String,
    credential: SecretString,
}

impl GoogleTtsBackend {
    /// Create a new backend client
    ///
    /// # Errors
    ///
    /// Returns error if the credential is empty
    pub fn new(endpoint: impl Into<String>, credential: SecretString) -> Result<Self> {
        if credential.expose_secret().trim().is_empty() {
            return Err(Error::Config("TTS backend credential required".to_string()));
        }

        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credential,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.credential.expose_secret())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeBody<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum SynthesisInput<'a> {
    Text(&'a str),
    Ssml(&'a str),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig<'a> {
    audio_encoding: &'a str,
    speaking_rate: f64,
    pitch: f64,
    volume_gain_db: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<VoiceEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoiceEntry {
    name: String,
    #[serde(default)]
    language_codes: Vec<String>,
    #[serde(default)]
    ssml_gender: VoiceGender,
    #[serde(default)]
    natural_sample_rate_hertz: u32,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Map an HTTP status to a failure class
#[must_use]
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 | 403 => ErrorKind::Authentication,
        429 => ErrorKind::RateLimit,
        500 | 502 | 503 | 504 => ErrorKind::ServiceUnavailable,
        400..=499 => ErrorKind::Api,
        _ => ErrorKind::Unknown,
    }
}

/// Parse a `Retry-After` header given in seconds
fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn transport_error(e: &reqwest::Error) -> Error {
    Error::backend(ErrorKind::Network, e.to_string())
}

/// Turn a non-success response into a classified error
async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or(body);

    Error::Backend {
        kind: classify_status(status),
        message: format!("{status}: {message}"),
        retry_after,
    }
}

#[async_trait]
impl SpeechBackend for GoogleTtsBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<BackendAudio> {
        let input = if request.ssml {
            SynthesisInput::Ssml(&request.text)
        } else {
            SynthesisInput::Text(&request.text)
        };

        let body = SynthesizeBody {
            input,
            voice: VoiceSelection {
                language_code: &request.language_code,
                name: &request.voice_id,
            },
            audio_config: AudioConfig {
                audio_encoding: request.audio_format.as_str(),
                speaking_rate: request.speaking_rate,
                pitch: request.pitch,
                volume_gain_db: request.volume_gain_db,
            },
        };

        let response = self
            .client
            .post(format!("{}/text:synthesize", self.endpoint))
            .header(header::AUTHORIZATION, self.bearer())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| Error::backend(ErrorKind::Api, format!("malformed response: {e}")))?;

        tracing::debug!(
            voice = %request.voice_id,
            encoded_bytes = parsed.audio_content.len(),
            "backend synthesis complete"
        );

        Ok(BackendAudio {
            audio_content: parsed.audio_content,
            voice_name: request.voice_id.clone(),
        })
    }

    async fn list_voices(&self, language_code: Option<&str>) -> Result<Vec<Voice>> {
        let mut request = self
            .client
            .get(format!("{}/voices", self.endpoint))
            .header(header::AUTHORIZATION, self.bearer());
        if let Some(code) = language_code {
            request = request.query(&[("languageCode", code)]);
        }

        let response = request.send().await.map_err(|e| transport_error(&e))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| Error::backend(ErrorKind::Api, format!("malformed voice list: {e}")))?;

        Ok(parsed
            .voices
            .into_iter()
            .map(|v| {
                Voice::new(
                    v.name,
                    v.language_codes,
                    v.ssml_gender,
                    v.natural_sample_rate_hertz,
                )
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "google-tts"
    }
}
