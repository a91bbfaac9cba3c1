//! Single-slot audio playback
//!
//! [`AudioPlaybackController`] owns at most one active stream. Starting new
//! audio tears down the previous stream first, and every stream is tagged
//! with a generation so an end signal from a replaced stream is ignored.

mod speaker;

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;

pub use speaker::SpeakerOutput;

use crate::Result;
use crate::tts::AudioClip;

/// Playback rate bounds
pub const PLAYBACK_RATE_RANGE: (f32, f32) = (0.25, 4.0);

/// Callback fired once when audio reaches its natural end
pub type EndedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opens output streams for encoded audio
pub trait AudioOutput: Send + Sync {
    /// Prepare a paused stream for `audio`
    ///
    /// `on_finished` must be called at most once, after [`OutputStream::play`],
    /// when the stream runs out of audio. It must not be called from inside
    /// `open` or any `OutputStream` method.
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded or no device is available
    fn open(&self, audio: &AudioClip, on_finished: EndedCallback)
    -> Result<Box<dyn OutputStream>>;
}

/// One open output stream
pub trait OutputStream: Send {
    /// Start or continue output
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the stream
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn set_rate(&mut self, rate: f32);
    fn seek(&mut self, position: Duration);
    fn position(&self) -> Duration;
    fn duration(&self) -> Duration;
    /// Free device resources; the stream is unusable afterwards
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
    Ended,
}

/// Snapshot of the controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackState {
    pub has_audio: bool,
    pub status: PlaybackStatus,
    pub position: Duration,
    pub duration: Duration,
    pub volume: f32,
    pub rate: f32,
}

struct Slot {
    generation: u64,
    stream: Option<Box<dyn OutputStream>>,
    on_ended: Option<EndedCallback>,
    status: PlaybackStatus,
    /// Duration of the last stream, kept after it ends
    duration: Duration,
    volume: f32,
    rate: f32,
}

impl Slot {
    /// Stop and release the active stream, if any
    fn teardown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.pause();
            stream.release();
        }
        self.on_ended = None;
        self.generation += 1;
    }
}

/// Controller for a single active audio stream
pub struct AudioPlaybackController {
    output: Arc<dyn AudioOutput>,
    slot: Arc<Mutex<Slot>>,
}

impl AudioPlaybackController {
    #[must_use]
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                stream: None,
                on_ended: None,
                status: PlaybackStatus::Idle,
                duration: Duration::ZERO,
                volume: 1.0,
                rate: 1.0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace whatever is playing with `audio`
    ///
    /// `on_ended` fires once if the audio plays to its natural end. It does
    /// not fire when the audio is stopped or replaced.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be opened or started; the slot is
    /// left idle in that case
    pub fn play(&self, audio: &AudioClip, on_ended: Option<EndedCallback>) -> Result<()> {
        let mut slot = self.lock();
        slot.teardown();
        slot.status = PlaybackStatus::Idle;
        slot.duration = Duration::ZERO;

        let generation = slot.generation;
        let weak = Arc::downgrade(&self.slot);
        let on_finished: EndedCallback = Box::new(move || finish(&weak, generation));

        let mut stream = self.output.open(audio, on_finished)?;
        stream.set_volume(slot.volume);
        stream.set_rate(slot.rate);
        if let Err(e) = stream.play() {
            stream.release();
            tracing::warn!(error = %e, "playback failed to start");
            return Err(e);
        }

        slot.duration = stream.duration();
        slot.stream = Some(stream);
        slot.on_ended = on_ended;
        slot.status = PlaybackStatus::Playing;

        tracing::debug!(
            generation,
            format = %audio.format(),
            duration_ms = slot.duration.as_millis(),
            "playback started"
        );
        Ok(())
    }

    pub fn pause(&self) {
        let mut slot = self.lock();
        if slot.status != PlaybackStatus::Playing {
            return;
        }
        if let Some(stream) = slot.stream.as_mut() {
            stream.pause();
            slot.status = PlaybackStatus::Paused;
        }
    }

    /// Continue paused audio
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the stream
    pub fn resume(&self) -> Result<()> {
        let mut slot = self.lock();
        if slot.status != PlaybackStatus::Paused {
            return Ok(());
        }
        if let Some(stream) = slot.stream.as_mut() {
            stream.play()?;
            slot.status = PlaybackStatus::Playing;
        }
        Ok(())
    }

    /// Stop playback and release the stream
    pub fn stop(&self) {
        let mut slot = self.lock();
        if slot.stream.is_none() && slot.status == PlaybackStatus::Idle {
            return;
        }
        slot.teardown();
        slot.status = PlaybackStatus::Idle;
        slot.duration = Duration::ZERO;
        tracing::debug!("playback stopped");
    }

    /// Set output volume, clamped to `0.0..=1.0`
    pub fn set_volume(&self, volume: f32) {
        let mut slot = self.lock();
        slot.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            1.0
        };
        let volume = slot.volume;
        if let Some(stream) = slot.stream.as_mut() {
            stream.set_volume(volume);
        }
    }

    /// Set playback speed, clamped to [`PLAYBACK_RATE_RANGE`]
    pub fn set_playback_rate(&self, rate: f32) {
        let mut slot = self.lock();
        slot.rate = if rate.is_finite() {
            rate.clamp(PLAYBACK_RATE_RANGE.0, PLAYBACK_RATE_RANGE.1)
        } else {
            1.0
        };
        let rate = slot.rate;
        if let Some(stream) = slot.stream.as_mut() {
            stream.set_rate(rate);
        }
    }

    /// Jump to `position`, clamped to the audio duration
    pub fn seek_to(&self, position: Duration) {
        let mut slot = self.lock();
        let duration = slot.duration;
        if let Some(stream) = slot.stream.as_mut() {
            stream.seek(position.min(duration));
        }
    }

    /// Current state; never fails
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        let slot = self.lock();
        let position = match (&slot.stream, slot.status) {
            (_, PlaybackStatus::Ended) => slot.duration,
            (Some(stream), _) => stream.position(),
            (None, _) => Duration::ZERO,
        };
        PlaybackState {
            has_audio: slot.stream.is_some(),
            status: slot.status,
            position,
            duration: slot.duration,
            volume: slot.volume,
            rate: slot.rate,
        }
    }
}

impl Drop for AudioPlaybackController {
    fn drop(&mut self) {
        self.lock().teardown();
    }
}

impl std::fmt::Debug for AudioPlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPlaybackController")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Natural end of the stream tagged `generation`
fn finish(slot: &Weak<Mutex<Slot>>, generation: u64) {
    let Some(slot) = slot.upgrade() else {
        return;
    };

    let callback = {
        let mut slot = slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.generation != generation || slot.stream.is_none() {
            tracing::trace!(generation, "ignoring end of replaced stream");
            return;
        }
        if let Some(mut stream) = slot.stream.take() {
            stream.release();
        }
        slot.status = PlaybackStatus::Ended;
        slot.on_ended.take()
    };

    tracing::debug!(generation, "playback ended");
    if let Some(callback) = callback {
        callback();
    }
}
