//! Synthesis orchestration
//!
//! [`SynthesisOrchestrator`] is the single entry point for callers. A
//! request flows through validation, admission control and the audio cache
//! before the backend is called under the retry policy. Completed requests
//! are stored in the cache and counted in the usage metrics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use base64::Engine;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::audio::AudioClip;
use super::backend::SpeechBackend;
use super::cache::{AudioCache, CacheStats};
use super::cache_key::cache_key;
use super::probe::{AudioProbe, CodecProbe};
use super::rate_limiter::RateLimiter;
use super::request::{RequestAnalytics, SynthesisRequest, SynthesisResponse};
use super::retry::RetryExecutor;
use super::validation::RequestValidator;
use super::voices::{
    Voice, VoiceFilter, VoiceTier, all_fallback_voices, cost_for, fallback_voices, sort_by_tier,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::metrics::{KeyValueStore, RequestUsage, UsageMetrics, UsageMetricsAggregator};
use crate::playback::{AudioPlaybackController, EndedCallback};
use crate::{Error, Result, SynthesisError};

/// Voice name reported for responses served from the cache
pub const CACHED_VOICE_NAME: &str = "cached";

/// Interval between sweeps of stale rate buckets
const RATE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Builder for [`SynthesisOrchestrator`]
pub struct OrchestratorBuilder {
    config: Config,
    backend: Arc<dyn SpeechBackend>,
    probe: Arc<dyn AudioProbe>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    playback: Option<Arc<AudioPlaybackController>>,
}

impl OrchestratorBuilder {
    /// Use a different metadata probe than [`CodecProbe`]
    #[must_use]
    pub fn probe(mut self, probe: Arc<dyn AudioProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Persist usage metrics through `store`
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable `synthesize_and_play`
    #[must_use]
    pub fn playback(mut self, playback: Arc<AudioPlaybackController>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Load persisted metrics and start background tasks
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub async fn build(self) -> Result<SynthesisOrchestrator> {
        self.config.validate()?;

        let metrics =
            Arc::new(UsageMetricsAggregator::load(self.store, Arc::clone(&self.clock)).await);
        let rate_limiter = Arc::new(RateLimiter::new(
            self.config.rate_limit,
            Arc::clone(&self.clock),
        ));

        let tasks = vec![
            spawn_rate_sweep(Arc::clone(&rate_limiter)),
            spawn_metrics_save(Arc::clone(&metrics), self.config.metrics.save_interval),
        ];

        tracing::info!(
            backend = self.backend.name(),
            cache = self.config.cache.enabled,
            rate_limit = self.config.rate_limit.requests_per_minute,
            max_attempts = self.config.retry.max_attempts,
            "synthesis orchestrator ready"
        );

        Ok(SynthesisOrchestrator {
            validator: RequestValidator::new(self.config.max_text_length),
            cache: Mutex::new(AudioCache::new(
                &self.config.cache,
                Arc::clone(&self.clock),
            )),
            retry: RetryExecutor::new(self.config.retry.clone()),
            config: self.config,
            backend: self.backend,
            probe: self.probe,
            rate_limiter,
            metrics,
            playback: self.playback,
            clock: self.clock,
            destroyed: AtomicBool::new(false),
            tasks: Mutex::new(tasks),
        })
    }
}

fn spawn_rate_sweep(rate_limiter: Arc<RateLimiter>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            rate_limiter.sweep();
        }
    })
}

fn spawn_metrics_save(metrics: Arc<UsageMetricsAggregator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics.persist().await;
        }
    })
}

/// Facade over validation, caching, admission control, retries and metrics
pub struct SynthesisOrchestrator {
    config: Config,
    backend: Arc<dyn SpeechBackend>,
    probe: Arc<dyn AudioProbe>,
    validator: RequestValidator,
    cache: Mutex<AudioCache>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
    metrics: Arc<UsageMetricsAggregator>,
    playback: Option<Arc<AudioPlaybackController>>,
    clock: Arc<dyn Clock>,
    destroyed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SynthesisOrchestrator {
    /// Start building an orchestrator around `backend`
    #[must_use]
    pub fn builder(config: Config, backend: Arc<dyn SpeechBackend>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            backend,
            probe: Arc::new(CodecProbe),
            store: None,
            clock: Arc::new(SystemClock),
            playback: None,
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::Destroyed);
        }
        Ok(())
    }

    fn cache(&self) -> MutexGuard<'_, AudioCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// A request for `text` using the configured default voice and format
    #[must_use]
    pub fn request(&self, text: impl Into<String>) -> SynthesisRequest {
        SynthesisRequest::new(text)
            .with_voice(
                self.config.default_language.clone(),
                self.config.default_voice.clone(),
            )
            .with_format(self.config.default_format)
    }

    /// Synthesize speech for `request`
    ///
    /// Identical requests are served from the cache at zero cost. The caller
    /// may be held back by the rate limiter until the next minute.
    ///
    /// # Errors
    ///
    /// Returns `Error::Destroyed` after [`destroy`](Self::destroy); every
    /// other failure is reported as `Error::Synthesis`
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisResponse> {
        self.ensure_alive()?;
        self.synthesize_inner(request).await.map_err(|e| match e {
            Error::Destroyed | Error::Synthesis(_) => e,
            other => Error::Synthesis(SynthesisError::wrap(&other)),
        })
    }

    async fn synthesize_inner(&self, request: &SynthesisRequest) -> Result<SynthesisResponse> {
        let started = Instant::now();
        self.validator.validate(request)?;
        self.rate_limiter.record_and_wait().await;

        let characters = request.character_count();
        let caching = request.use_cache && self.config.cache.enabled;
        let key = cache_key(request);

        if caching {
            let hit = self.cache().lookup(&key);
            if let Some(hit) = hit {
                self.record_usage(characters, 0.0, true).await;
                tracing::debug!(key = %key, characters, "served from audio cache");
                return Ok(SynthesisResponse {
                    audio: hit.audio,
                    cost: 0.0,
                    cached: true,
                    voice_name: CACHED_VOICE_NAME.to_string(),
                    processing_time: started.elapsed(),
                    metadata: hit.metadata,
                    analytics: self.analytics(characters, true),
                });
            }
        }

        let timeout = self.config.request_timeout;
        let result = self
            .retry
            .run(|attempt| {
                let backend = Arc::clone(&self.backend);
                async move {
                    tracing::debug!(attempt, backend = backend.name(), "calling speech backend");
                    tokio::time::timeout(timeout, backend.synthesize(request))
                        .await
                        .map_err(|_| Error::Timeout(timeout))?
                }
            })
            .await?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(result.audio_content.trim())
            .map_err(|e| Error::Audio(format!("invalid base64 audio content: {e}")))?;
        let audio = AudioClip::new(bytes, request.audio_format);
        let metadata = self.probe.probe(&audio)?;

        let tier = VoiceTier::from_voice_name(&result.voice_name);
        let cost = cost_for(characters, tier);

        if caching && !self.cache().store(&key, audio.clone(), metadata.clone()) {
            tracing::warn!(key = %key, "synthesized audio was not cached");
        }

        self.record_usage(characters, cost, false).await;

        tracing::info!(
            voice = %result.voice_name,
            tier = tier.as_str(),
            characters,
            cost,
            bytes = audio.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "speech synthesized"
        );

        Ok(SynthesisResponse {
            audio,
            cost,
            cached: false,
            voice_name: result.voice_name,
            processing_time: started.elapsed(),
            metadata,
            analytics: self.analytics(characters, false),
        })
    }

    fn analytics(&self, character_count: usize, cache_hit: bool) -> RequestAnalytics {
        RequestAnalytics {
            request_id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            character_count,
            cache_hit,
        }
    }

    async fn record_usage(&self, characters: usize, cost: f64, cache_hit: bool) {
        self.metrics
            .record(RequestUsage {
                characters: u64::try_from(characters).unwrap_or(u64::MAX),
                cost,
                cache_hit,
            })
            .await;
    }

    /// Synthesize, then hand the audio to the playback controller
    ///
    /// # Errors
    ///
    /// Returns the synthesis failure, `Error::Playback` when no controller is
    /// configured, or the controller's failure to start
    pub async fn synthesize_and_play(
        &self,
        request: &SynthesisRequest,
        on_ended: Option<EndedCallback>,
    ) -> Result<SynthesisResponse> {
        self.ensure_alive()?;
        let playback = self
            .playback
            .as_ref()
            .ok_or_else(|| Error::Playback("no playback controller configured".to_string()))?;

        let response = self.synthesize(request).await?;
        playback.play(&response.audio, on_ended)?;
        Ok(response)
    }

    /// Playback controller, if one was configured
    #[must_use]
    pub fn playback(&self) -> Option<&Arc<AudioPlaybackController>> {
        self.playback.as_ref()
    }

    /// Cost in USD of synthesizing `text` at `tier`, without calling anything
    ///
    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub fn estimate_cost(&self, text: &str, tier: VoiceTier) -> Result<f64> {
        self.ensure_alive()?;
        Ok(cost_for(text.chars().count(), tier))
    }

    /// Whether a request would be admitted without waiting
    ///
    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub fn can_make_request(&self) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.rate_limiter.can_proceed())
    }

    /// How long until a request would be admitted; zero when not blocked
    ///
    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub fn time_until_next_request(&self) -> Result<Duration> {
        self.ensure_alive()?;
        Ok(self.rate_limiter.time_until_next())
    }

    /// Voices for `language_code`, best tier first
    ///
    /// Falls back to the built-in list when the backend catalog is unavailable.
    ///
    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub async fn get_voices_for_language(&self, language_code: &str) -> Result<Vec<Voice>> {
        self.ensure_alive()?;
        let mut voices = match self.list_voices(Some(language_code)).await {
            Ok(voices) => voices
                .into_iter()
                .filter(|v| v.supports(language_code))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    language = language_code,
                    error = %e,
                    "voice catalog unavailable, using fallback voices"
                );
                fallback_voices(language_code)
            }
        };
        sort_by_tier(&mut voices);
        Ok(voices)
    }

    /// All voices matching `filter`, best tier first
    ///
    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub async fn get_all_voices(&self, filter: &VoiceFilter) -> Result<Vec<Voice>> {
        self.ensure_alive()?;
        let catalog = match self.list_voices(filter.language_code.as_deref()).await {
            Ok(voices) => voices,
            Err(e) => {
                tracing::warn!(error = %e, "voice catalog unavailable, using fallback voices");
                all_fallback_voices()
            }
        };
        let mut voices: Vec<Voice> = catalog.into_iter().filter(|v| filter.matches(v)).collect();
        sort_by_tier(&mut voices);
        Ok(voices)
    }

    async fn list_voices(&self, language_code: Option<&str>) -> Result<Vec<Voice>> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, self.backend.list_voices(language_code))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Snapshot of usage metrics
    ///
    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub fn get_usage_metrics(&self) -> Result<UsageMetrics> {
        self.ensure_alive()?;
        Ok(self.metrics.snapshot())
    }

    /// Start a new session scope
    ///
    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub fn reset_session_metrics(&self) -> Result<()> {
        self.ensure_alive()?;
        self.metrics.reset_session();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub fn get_cache_stats(&self) -> Result<CacheStats> {
        self.ensure_alive()?;
        Ok(self.cache().stats())
    }

    /// # Errors
    ///
    /// Returns `Error::Destroyed` after teardown
    pub fn clear_cache(&self) -> Result<()> {
        self.ensure_alive()?;
        self.cache().clear();
        Ok(())
    }

    /// Tear down the instance
    ///
    /// Stops background tasks, flushes metrics, clears the cache and rate
    /// window, and stops playback. Later calls are no-ops; every other
    /// public operation fails with `Error::Destroyed` afterwards.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in &tasks {
            task.abort();
        }

        self.metrics.persist().await;
        self.cache().clear();
        self.rate_limiter.reset();
        if let Some(playback) = &self.playback {
            playback.stop();
        }

        tracing::info!(tasks = tasks.len(), "synthesis orchestrator destroyed");
    }

    /// Whether [`destroy`](Self::destroy) has run
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl Drop for SynthesisOrchestrator {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().unwrap_or_else(|e| e.into_inner()).drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SynthesisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisOrchestrator")
            .field("backend", &self.backend.name())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
