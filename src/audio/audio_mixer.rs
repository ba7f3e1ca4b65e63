//! Audio mixer for combining track outputs into a single stream.
//!
//! Stateless helpers shared by the loopback mix and local output.

/// Mix multiple sample vectors into a single mono output.
///
/// Handles:
/// - Different-length inputs by zero-padding the shorter ones
/// - Normalization to prevent clipping
/// - Resampling when sources have different sample rates
pub struct AudioMixer;

impl AudioMixer {
    /// Mix sample vectors (all at the same sample rate) into a single output.
    /// Zero-pads shorter inputs and normalizes to prevent clipping.
    pub fn mix(sources: &[Vec<f32>]) -> Vec<f32> {
        let non_empty: Vec<&Vec<f32>> = sources.iter().filter(|s| !s.is_empty()).collect();

        match non_empty.len() {
            0 => return Vec::new(),
            1 => return non_empty[0].clone(),
            _ => {}
        }

        let max_len = non_empty.iter().map(|s| s.len()).max().unwrap_or(0);
        let num_sources = non_empty.len() as f32;

        let mut mixed = vec![0.0f32; max_len];

        for source in &non_empty {
            for (i, &sample) in source.iter().enumerate() {
                mixed[i] += sample;
            }
        }

        // Average the samples to prevent clipping
        for sample in &mut mixed {
            *sample /= num_sources;
        }

        // Normalize if any samples exceed [-1.0, 1.0]
        let max_abs = mixed.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        if max_abs > 1.0 {
            for sample in &mut mixed {
                *sample /= max_abs;
            }
        }

        mixed
    }

    /// Resample audio from one sample rate to another using linear interpolation.
    /// Suitable for speech audio where perfect quality isn't critical.
    pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
        if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
            return samples.to_vec();
        }

        let ratio = from_rate as f64 / to_rate as f64;
        let new_len = (samples.len() as f64 / ratio).ceil() as usize;
        let mut resampled = Vec::with_capacity(new_len);

        for i in 0..new_len {
            let src_pos = i as f64 * ratio;
            let src_idx = src_pos as usize;
            let frac = src_pos - src_idx as f64;

            let sample = if src_idx + 1 < samples.len() {
                // Linear interpolation
                samples[src_idx] as f64 * (1.0 - frac) + samples[src_idx + 1] as f64 * frac
            } else if src_idx < samples.len() {
                samples[src_idx] as f64
            } else {
                0.0
            };

            resampled.push(sample as f32);
        }

        resampled
    }

    /// Pull one channel out of interleaved frames.
    ///
    /// Returns an empty vector when `channels` is zero or `index` is out of range.
    pub fn extract_channel(interleaved: &[f32], channels: u16, index: u16) -> Vec<f32> {
        if channels == 0 || index >= channels {
            return Vec::new();
        }

        interleaved
            .chunks_exact(channels as usize)
            .map(|frame| frame[index as usize])
            .collect()
    }

    /// Number of source frames needed to produce `frames` output frames.
    pub fn source_frames_for(frames: usize, from_rate: u32, to_rate: u32) -> usize {
        if from_rate == to_rate || to_rate == 0 {
            return frames;
        }
        (frames as f64 * from_rate as f64 / to_rate as f64).ceil() as usize
    }
}
