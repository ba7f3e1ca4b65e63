//! Decoding of fetched audio resources into PCM.
//!
//! Delegates container and codec work to Symphonia. The whole resource is
//! decoded up front; playback then reads from the shared buffer.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use super::audio_source::SignalGenerator;
use crate::error::{BridgeError, Result};

/// Fully decoded audio, interleaved `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frames() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }

    /// An independent playback cursor over the shared samples.
    pub fn playback(&self) -> BufferPlayback {
        BufferPlayback {
            audio: self.clone(),
            cursor: 0,
        }
    }
}

/// Plays a [`DecodedAudio`] once from the start.
pub struct BufferPlayback {
    audio: DecodedAudio,
    cursor: usize,
}

impl SignalGenerator for BufferPlayback {
    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    fn channels(&self) -> u16 {
        self.audio.channels
    }

    fn render(&mut self, out: &mut [f32]) -> usize {
        let channels = self.audio.channels as usize;
        if channels == 0 {
            return 0;
        }

        let remaining = self.audio.frames() - self.cursor;
        let frames = (out.len() / channels).min(remaining);
        let start = self.cursor * channels;
        let end = start + frames * channels;
        out[..frames * channels].copy_from_slice(&self.audio.samples[start..end]);
        self.cursor += frames;
        frames
    }

    fn is_finished(&self) -> bool {
        self.cursor >= self.audio.frames()
    }
}

/// Decode an encoded audio resource.
///
/// `extension` is a container hint ("mp3", "wav", ...). Setting `cancel`
/// aborts between packets and releases the decoder.
pub fn decode(bytes: Vec<u8>, extension: Option<&str>, cancel: &AtomicBool) -> Result<DecodedAudio> {
    let byte_len = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| BridgeError::unavailable(format!("unrecognized audio format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| BridgeError::unavailable("resource contains no audio track"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| BridgeError::unavailable(format!("unsupported audio codec: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        if cancel.load(Ordering::Acquire) {
            debug!("Decode cancelled after {} samples", samples.len());
            return Err(BridgeError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(BridgeError::unavailable(format!(
                    "failed to read audio packet: {e}"
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if sample_rate == 0 {
                    sample_rate = spec.rate;
                }
                if channels == 0 {
                    channels = spec.channels.count() as u16;
                }

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable audio packet: {}", e);
            }
            Err(e) => {
                return Err(BridgeError::unavailable(format!("failed to decode audio: {e}")));
            }
        }
    }

    if samples.is_empty() {
        return Err(BridgeError::unavailable("resource decoded to no audio frames"));
    }

    let audio = DecodedAudio::new(samples, sample_rate, channels);
    info!(
        "Decoded {} bytes into {} frames ({}Hz, {} channel(s), {:?})",
        byte_len,
        audio.frames(),
        audio.sample_rate(),
        audio.channels(),
        audio.duration()
    );
    Ok(audio)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    /// Encode a sine as 16-bit WAV entirely in memory.
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let value = ((t * 440.0 * std::f32::consts::TAU).sin() * 16000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav() {
        let bytes = wav_bytes(16000, 2, 1600);
        let audio = decode(bytes, Some("wav"), &AtomicBool::new(false)).unwrap();
        assert_eq!(audio.sample_rate(), 16000);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 1600);
        assert_eq!(audio.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_decode_garbage_is_unavailable() {
        let result = decode(vec![0x13; 512], None, &AtomicBool::new(false));
        assert!(matches!(result, Err(BridgeError::ResourceUnavailable(_))));
    }

    #[test]
    fn test_decode_honours_cancellation() {
        let bytes = wav_bytes(16000, 1, 1600);
        let result = decode(bytes, Some("wav"), &AtomicBool::new(true));
        assert!(matches!(result, Err(BridgeError::Cancelled)));
    }

    #[test]
    fn test_playback_plays_once() {
        let audio = DecodedAudio::new(vec![0.1, 0.2, 0.3, 0.4, 0.5], 8000, 1);
        let mut playback = audio.playback();

        let mut out = [0.0f32; 3];
        assert_eq!(playback.render(&mut out), 3);
        assert_eq!(out, [0.1, 0.2, 0.3]);
        assert!(!playback.is_finished());

        assert_eq!(playback.render(&mut out), 2);
        assert_eq!(&out[..2], &[0.4, 0.5]);
        assert!(playback.is_finished());
        assert_eq!(playback.render(&mut out), 0);
    }

    #[test]
    fn test_playbacks_are_independent() {
        let audio = DecodedAudio::new(vec![0.1, 0.2], 8000, 1);
        let mut first = audio.playback();
        let mut second = audio.playback();
        let mut out = [0.0f32; 2];
        first.render(&mut out);
        assert!(first.is_finished());
        assert!(!second.is_finished());
        assert_eq!(second.render(&mut out), 2);
    }
}
