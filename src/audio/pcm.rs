//! Conversions between sample buffers and the f32 little-endian wire format.

use crate::defaults::{BYTES_PER_SAMPLE, SAMPLE_RATE};

/// Encode samples as f32 little-endian bytes.
pub fn f32_to_le_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Decode f32 little-endian bytes; a trailing partial sample is ignored.
pub fn le_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Scale a 16-bit PCM sample into [-1.0, 1.0).
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Average interleaved frames of `channels` samples down to mono.
///
/// A trailing partial frame is dropped.
pub fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampling from `from_rate` to `to_rate`.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;
    (0..output_len)
        .map(|i| {
            let position = i as f64 * ratio;
            let index = position.floor() as usize;
            let fraction = (position - index as f64) as f32;
            match (samples.get(index), samples.get(index + 1)) {
                (Some(&left), Some(&right)) => left + (right - left) * fraction,
                (Some(&left), None) => left,
                _ => samples[samples.len() - 1],
            }
        })
        .collect()
}

/// Seconds of audio in `samples` mono samples at the wire rate.
pub fn samples_to_secs(samples: usize) -> f64 {
    samples as f64 / SAMPLE_RATE as f64
}

/// Number of mono samples covering `secs` seconds, rounded down.
pub fn secs_to_samples(secs: f64) -> usize {
    if secs <= 0.0 {
        return 0;
    }
    (secs * SAMPLE_RATE as f64) as usize
}

/// Seconds of audio in a wire byte buffer.
pub fn bytes_to_secs(bytes: usize) -> f64 {
    samples_to_secs(bytes / BYTES_PER_SAMPLE)
}
