//! Audio output to the default speaker
//!
//! `cpal` streams are not `Send`, so each opened clip owns its stream on a
//! dedicated thread. The controller side talks to it through a shared play
//! head and a command channel.

use std::io::Cursor;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::{AudioOutput, EndedCallback, OutputStream};
use crate::tts::{AudioClip, AudioFormat};
use crate::{Error, Result};

/// Mono PCM decoded from an encoded clip
struct Pcm {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Shared between the controller and the device callback
struct PlayHead {
    /// Fractional index into the sample buffer
    position: f64,
    playing: bool,
    volume: f32,
    rate: f32,
    finished: bool,
}

enum Command {
    Finished,
    Stop,
}

/// Plays audio through the default output device
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeakerOutput;

impl SpeakerOutput {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AudioOutput for SpeakerOutput {
    fn open(
        &self,
        audio: &AudioClip,
        on_finished: EndedCallback,
    ) -> Result<Box<dyn OutputStream>> {
        let pcm = decode(audio)?;
        if pcm.samples.is_empty() || pcm.sample_rate == 0 {
            return Err(Error::Playback("decoded audio is empty".to_string()));
        }
        Ok(Box::new(SpeakerStream::spawn(pcm, on_finished)?))
    }
}

struct SpeakerStream {
    head: Arc<Mutex<PlayHead>>,
    commands: mpsc::Sender<Command>,
    sample_rate: u32,
    len: usize,
}

impl SpeakerStream {
    fn spawn(pcm: Pcm, on_finished: EndedCallback) -> Result<Self> {
        let head = Arc::new(Mutex::new(PlayHead {
            position: 0.0,
            playing: false,
            volume: 1.0,
            rate: 1.0,
            finished: false,
        }));
        let (commands, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        let sample_rate = pcm.sample_rate;
        let len = pcm.samples.len();
        let thread_head = Arc::clone(&head);
        let finished_tx = commands.clone();

        std::thread::Builder::new()
            .name("beacon-tts-playback".to_string())
            .spawn(move || {
                let stream = match build_stream(pcm, thread_head, finished_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::Playback(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                let mut on_finished = Some(on_finished);
                // Runs until release or drop sends Stop
                while let Ok(Command::Finished) = rx.recv() {
                    if let Some(callback) = on_finished.take() {
                        callback();
                    }
                }
                drop(stream);
                tracing::trace!("playback thread exiting");
            })?;

        ready_rx
            .recv()
            .map_err(|_| Error::Playback("playback thread exited early".to_string()))??;

        Ok(Self {
            head,
            commands,
            sample_rate,
            len,
        })
    }

    fn head(&self) -> MutexGuard<'_, PlayHead> {
        self.head.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OutputStream for SpeakerStream {
    fn play(&mut self) -> Result<()> {
        self.head().playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.head().playing = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.head().volume = volume;
    }

    fn set_rate(&mut self, rate: f32) {
        self.head().rate = rate;
    }

    #[allow(clippy::cast_precision_loss)]
    fn seek(&mut self, position: Duration) {
        let index = position.as_secs_f64() * f64::from(self.sample_rate);
        let mut head = self.head();
        head.position = index.min(self.len as f64);
        head.finished = false;
    }

    fn position(&self) -> Duration {
        Duration::from_secs_f64(self.head().position / f64::from(self.sample_rate))
    }

    #[allow(clippy::cast_precision_loss)]
    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.len as f64 / f64::from(self.sample_rate))
    }

    fn release(&mut self) {
        self.head().playing = false;
        let _ = self.commands.send(Command::Stop);
    }
}

impl Drop for SpeakerStream {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Stop);
    }
}

/// Open the default device at the clip's rate when possible
fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let matching = device
        .supported_output_configs()
        .map_err(|e| Error::Playback(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .min_by_key(cpal::SupportedStreamConfigRange::channels);

    if let Some(config) = matching {
        return Ok(config.with_sample_rate(rate).config());
    }

    // Resampled in the callback instead
    device
        .default_output_config()
        .map(|c| c.config())
        .map_err(|e| Error::Playback(e.to_string()))
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::needless_pass_by_value
)]
fn build_stream(
    pcm: Pcm,
    head: Arc<Mutex<PlayHead>>,
    finished: mpsc::Sender<Command>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device available".to_string()))?;
    let config = output_config(&device, pcm.sample_rate)?;

    let channels = usize::from(config.channels);
    let step = f64::from(pcm.sample_rate) / f64::from(config.sample_rate.0);
    let samples = pcm.samples;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        source_rate = pcm.sample_rate,
        device_rate = config.sample_rate.0,
        channels,
        "audio output opened"
    );

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut head = head.lock().unwrap_or_else(|e| e.into_inner());
                for frame in data.chunks_mut(channels) {
                    let index = head.position as usize;
                    let sample = if head.playing && index < samples.len() {
                        head.position += step * f64::from(head.rate);
                        samples[index] * head.volume
                    } else {
                        0.0
                    };
                    frame.fill(sample);
                }

                if head.playing && head.position as usize >= samples.len() && !head.finished {
                    head.finished = true;
                    head.playing = false;
                    let _ = finished.send(Command::Finished);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))
}

fn decode(audio: &AudioClip) -> Result<Pcm> {
    match audio.format() {
        AudioFormat::Mp3 => decode_mp3(audio.bytes()),
        AudioFormat::Linear16 => decode_wav(audio.bytes()),
        AudioFormat::OggOpus => Err(Error::Playback(
            "OGG_OPUS playback is not supported by the speaker output".to_string(),
        )),
    }
}

/// Decode MP3 bytes to mono f32 samples
#[allow(clippy::cast_sign_loss)]
fn decode_mp3(data: &[u8]) -> Result<Pcm> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.channels == 0 {
                    continue;
                }
                sample_rate = frame.sample_rate.max(0) as u32;
                samples.extend(downmix(&frame.data, frame.channels));
            }
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof | minimp3::Error::InsufficientData) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(Pcm {
        samples,
        sample_rate,
    })
}

fn decode_wav(data: &[u8]) -> Result<Pcm> {
    let mut reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    let interleaved = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;

    Ok(Pcm {
        samples: downmix(&interleaved, usize::from(spec.channels)),
        sample_rate: spec.sample_rate,
    })
}

/// Average interleaved i16 channels into mono f32
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[i16], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.iter().map(|&s| f32::from(s) / 32768.0).collect();
    }
    interleaved
        .chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| f32::from(s) / 32768.0).sum();
            sum / frame.len() as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let mono = downmix(&[16384, -16384, 8192, 8192], 2);
        assert_eq!(mono.len(), 2);
        assert!(mono[0].abs() < f32::EPSILON);
        assert!((mono[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn decodes_wav_to_mono() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..100 {
                writer.write_sample(1000i16).unwrap();
                writer.write_sample(3000i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let clip = AudioClip::new(cursor.into_inner(), AudioFormat::Linear16);
        let pcm = decode(&clip).unwrap();
        assert_eq!(pcm.sample_rate, 16_000);
        assert_eq!(pcm.samples.len(), 100);
        assert!((pcm.samples[0] - 2000.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn opus_is_rejected_before_opening_a_device() {
        let clip = AudioClip::new(b"OggS".to_vec(), AudioFormat::OggOpus);
        assert!(matches!(decode(&clip), Err(Error::Playback(_))));
    }
}
