//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{TimeZone, Utc};

use beacon_tts::metrics::KeyValueStore;
use beacon_tts::playback::{AudioOutput, EndedCallback, OutputStream};
use beacon_tts::tts::{
    AudioClip, AudioMetadata, AudioProbe, BackendAudio, SpeechBackend, SynthesisOrchestrator,
    SynthesisRequest, Voice, VoiceGender,
};
use beacon_tts::{Config, Error, ErrorKind, ManualClock, Result};

/// Audio bytes every scripted synthesis returns
pub const AUDIO: &[u8] = b"fake-mp3-payload";

/// Fixed starting instant, mid-minute so rate windows are predictable
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 30).unwrap(),
    ))
}

/// What the scripted backend does on each call
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Succeed,
    /// Fail every call with this classification
    FailWith(ErrorKind),
    /// Never answer within any sane timeout
    Hang,
}

/// Backend that follows a script and counts calls
pub struct ScriptedBackend {
    script: Mutex<Script>,
    calls: AtomicU32,
    catalog: Vec<Voice>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicU32::new(0),
            catalog: vec![
                Voice::new("en-US-Standard-C", vec!["en-US".into()], VoiceGender::Female, 24_000),
                Voice::new("en-US-Studio-O", vec!["en-US".into()], VoiceGender::Female, 24_000),
                Voice::new("en-US-Wavenet-D", vec!["en-US".into()], VoiceGender::Male, 24_000),
                Voice::new("de-DE-Neural2-B", vec!["de-DE".into()], VoiceGender::Male, 24_000),
            ],
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }
}

#[async_trait]
impl SpeechBackend for ScriptedBackend {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<BackendAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = *self.script.lock().unwrap();
        match script {
            Script::Succeed => Ok(BackendAudio {
                audio_content: base64::engine::general_purpose::STANDARD.encode(AUDIO),
                voice_name: request.voice_id.clone(),
            }),
            Script::FailWith(kind) => Err(Error::backend(kind, "scripted failure")),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::backend(ErrorKind::Unknown, "woke from hang"))
            }
        }
    }

    async fn list_voices(&self, language_code: Option<&str>) -> Result<Vec<Voice>> {
        if matches!(*self.script.lock().unwrap(), Script::FailWith(_)) {
            return Err(Error::backend(ErrorKind::ServiceUnavailable, "catalog down"));
        }
        Ok(self
            .catalog
            .iter()
            .filter(|v| language_code.is_none_or(|code| v.supports(code)))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Probe reporting one second of mono 24 kHz audio
pub struct StaticProbe;

impl AudioProbe for StaticProbe {
    fn probe(&self, audio: &AudioClip) -> Result<AudioMetadata> {
        Ok(AudioMetadata {
            duration_secs: 1.0,
            format: audio.format(),
            size_bytes: audio.len() as u64,
            sample_rate: 24_000,
            bit_rate: 128_000,
            channels: 1,
        })
    }
}

/// Store that rejects every operation
pub struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>> {
        Err(Error::Persistence("disk on fire".to_string()))
    }

    async fn set(&self, _key: &str, _value: serde_json::Value) -> Result<()> {
        Err(Error::Persistence("disk on fire".to_string()))
    }
}

/// Audio output that never touches a device
#[derive(Default)]
pub struct SilentOutput {
    pub opened: AtomicU32,
    finishers: Mutex<Vec<EndedCallback>>,
}

impl SilentOutput {
    /// Signal natural end of the most recently opened stream
    pub fn finish_latest(&self) {
        let callback = self.finishers.lock().unwrap().pop();
        if let Some(callback) = callback {
            callback();
        }
    }
}

struct SilentStream {
    position: Duration,
}

impl AudioOutput for SilentOutput {
    fn open(
        &self,
        _audio: &AudioClip,
        on_finished: EndedCallback,
    ) -> Result<Box<dyn OutputStream>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.finishers.lock().unwrap().push(on_finished);
        Ok(Box::new(SilentStream {
            position: Duration::ZERO,
        }))
    }
}

impl OutputStream for SilentStream {
    fn play(&mut self) -> Result<()> {
        Ok(())
    }
    fn pause(&mut self) {}
    fn set_volume(&mut self, _volume: f32) {}
    fn set_rate(&mut self, _rate: f32) {}
    fn seek(&mut self, position: Duration) {
        self.position = position;
    }
    fn position(&self) -> Duration {
        self.position
    }
    fn duration(&self) -> Duration {
        Duration::from_secs(1)
    }
    fn release(&mut self) {}
}

/// Configuration with fast retries for tests
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.base_delay = Duration::from_millis(10);
    config.request_timeout = Duration::from_secs(5);
    config
}

/// Orchestrator over `backend` with the static probe and manual clock
pub async fn orchestrator(config: Config, backend: Arc<ScriptedBackend>) -> SynthesisOrchestrator {
    SynthesisOrchestrator::builder(config, backend)
        .probe(Arc::new(StaticProbe))
        .clock(test_clock())
        .build()
        .await
        .expect("failed to build orchestrator")
}
