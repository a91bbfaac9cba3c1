//! Audio metadata extraction
//!
//! MP3 is walked frame by frame with `minimp3`, LINEAR16 is read as WAV with
//! `hound`, and Ogg Opus duration comes from the last page's granule position.

use std::io::Cursor;

use super::audio::{AudioClip, AudioFormat, AudioMetadata};
use crate::{Error, Result};

/// Opus always decodes at 48 kHz
const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Extracts playback metadata from encoded audio
pub trait AudioProbe: Send + Sync {
    /// Inspect `audio`
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the payload is malformed
    fn probe(&self, audio: &AudioClip) -> Result<AudioMetadata>;
}

/// Probe backed by the bundled decoders
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecProbe;

impl AudioProbe for CodecProbe {
    fn probe(&self, audio: &AudioClip) -> Result<AudioMetadata> {
        if audio.is_empty() {
            return Err(Error::Audio("empty audio payload".to_string()));
        }

        let metadata = match audio.format() {
            AudioFormat::Mp3 => probe_mp3(audio.bytes()),
            AudioFormat::Linear16 => probe_wav(audio.bytes()),
            AudioFormat::OggOpus => probe_ogg_opus(audio.bytes()),
        }?;

        tracing::trace!(
            format = %metadata.format,
            duration_secs = metadata.duration_secs,
            sample_rate = metadata.sample_rate,
            "probed audio"
        );
        Ok(metadata)
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn probe_mp3(data: &[u8]) -> Result<AudioMetadata> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut frames = 0u64;
    let mut duration_secs = 0.0f64;
    let mut sample_rate = 0u32;
    let mut channels = 0u16;
    let mut bitrate_sum = 0u64;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if frame.sample_rate <= 0 || frame.channels == 0 {
                    continue;
                }
                let per_channel = frame.data.len() / frame.channels;
                duration_secs += per_channel as f64 / f64::from(frame.sample_rate);
                sample_rate = frame.sample_rate as u32;
                channels = frame.channels as u16;
                bitrate_sum += u64::from(frame.bitrate.max(0) as u32);
                frames += 1;
            }
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof | minimp3::Error::InsufficientData) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if frames == 0 {
        return Err(Error::Audio("no MP3 frames found".to_string()));
    }

    Ok(AudioMetadata {
        duration_secs,
        format: AudioFormat::Mp3,
        size_bytes: data.len() as u64,
        sample_rate,
        channels,
        // minimp3 reports kbit/s per frame
        bit_rate: (bitrate_sum / frames * 1000) as u32,
    })
}

#[allow(clippy::cast_precision_loss)]
fn probe_wav(data: &[u8]) -> Result<AudioMetadata> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(Error::Audio("WAV header has zero sample rate".to_string()));
    }

    Ok(AudioMetadata {
        duration_secs: f64::from(reader.duration()) / f64::from(spec.sample_rate),
        format: AudioFormat::Linear16,
        size_bytes: data.len() as u64,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bit_rate: spec.sample_rate * u32::from(spec.channels) * u32::from(spec.bits_per_sample),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn probe_ogg_opus(data: &[u8]) -> Result<AudioMetadata> {
    if !data.starts_with(b"OggS") {
        return Err(Error::Audio("missing Ogg capture pattern".to_string()));
    }

    let head = find(data, b"OpusHead")
        .ok_or_else(|| Error::Audio("missing OpusHead packet".to_string()))?;
    let header = data
        .get(head..head + 19)
        .ok_or_else(|| Error::Audio("truncated OpusHead packet".to_string()))?;
    let channels = u16::from(header[9]);
    let pre_skip = u64::from(u16::from_le_bytes([header[10], header[11]]));

    // Granule position of the last page counts 48 kHz samples
    let last_page = rfind(data, b"OggS").unwrap_or(0);
    let granule = data
        .get(last_page + 6..last_page + 14)
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| Error::Audio("truncated Ogg page header".to_string()))?;

    let samples = granule.saturating_sub(pre_skip);
    let duration_secs = samples as f64 / f64::from(OPUS_SAMPLE_RATE);
    let bit_rate = if duration_secs > 0.0 {
        (data.len() as f64 * 8.0 / duration_secs) as u32
    } else {
        0
    };

    Ok(AudioMetadata {
        duration_secs,
        format: AudioFormat::OggOpus,
        size_bytes: data.len() as u64,
        sample_rate: OPUS_SAMPLE_RATE,
        channels,
        bit_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, samples: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..samples {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn ogg_page(granule: u64, body: &[u8]) -> Vec<u8> {
        let mut page = b"OggS".to_vec();
        page.push(0); // version
        page.push(0); // header type
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&[0u8; 12]); // serial, sequence, checksum
        page.push(1); // one segment
        page.push(u8::try_from(body.len()).unwrap());
        page.extend_from_slice(body);
        page
    }

    #[test]
    fn probes_wav() {
        let bytes = wav_bytes(24_000, 48_000);
        let clip = AudioClip::new(bytes.clone(), AudioFormat::Linear16);
        let meta = CodecProbe.probe(&clip).unwrap();

        assert_eq!(meta.format, AudioFormat::Linear16);
        assert_eq!(meta.sample_rate, 24_000);
        assert_eq!(meta.channels, 1);
        assert_eq!(meta.bit_rate, 24_000 * 16);
        assert_eq!(meta.size_bytes, bytes.len() as u64);
        assert!((meta.duration_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn probes_ogg_opus() {
        let mut opus_head = b"OpusHead".to_vec();
        opus_head.push(1); // version
        opus_head.push(2); // channels
        opus_head.extend_from_slice(&312u16.to_le_bytes()); // pre-skip
        opus_head.extend_from_slice(&24_000u32.to_le_bytes()); // input rate
        opus_head.extend_from_slice(&[0, 0, 0]); // gain, mapping family

        let mut data = ogg_page(0, &opus_head);
        data.extend(ogg_page(0, b"OpusTags"));
        data.extend(ogg_page(96_312, &[0u8; 40]));

        let clip = AudioClip::new(data, AudioFormat::OggOpus);
        let meta = CodecProbe.probe(&clip).unwrap();

        assert_eq!(meta.channels, 2);
        assert_eq!(meta.sample_rate, 48_000);
        assert!((meta.duration_secs - 2.0).abs() < 1e-9);
        assert!(meta.bit_rate > 0);
    }

    #[test]
    fn rejects_malformed_payloads() {
        let garbage = vec![0x42u8; 64];
        for format in [AudioFormat::Mp3, AudioFormat::Linear16, AudioFormat::OggOpus] {
            let clip = AudioClip::new(garbage.clone(), format);
            assert!(
                matches!(CodecProbe.probe(&clip), Err(Error::Audio(_))),
                "{format} should fail"
            );
        }
    }

    #[test]
    fn rejects_empty_payload() {
        let clip = AudioClip::new(Vec::new(), AudioFormat::Mp3);
        assert!(CodecProbe.probe(&clip).is_err());
    }
}
