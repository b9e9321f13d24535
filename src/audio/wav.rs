//! WAV decoding to 16 kHz mono f32, and writing of 16-bit PCM WAV.

use crate::audio::pcm::i16_to_f32;
use crate::defaults::SAMPLE_RATE;
use crate::error::{CapscribeError, Result};
use std::io::Read;
use std::path::Path;

/// Decode a WAV stream, downmixing to mono and resampling to 16 kHz.
pub fn read_wav<R: Read>(reader: R, label: &str) -> Result<Vec<f32>> {
    let mut wav_reader = hound::WavReader::new(reader).map_err(|e| format_error(label, e))?;
    let spec = wav_reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format_error(label, e))?,
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => wav_reader
            .samples::<i16>()
            .map(|s| s.map(i16_to_f32))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format_error(label, e))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| format_error(label, e))?
        }
    };

    let mono = downmix(interleaved, spec.channels);
    Ok(resample(&mono, spec.sample_rate, SAMPLE_RATE))
}

/// Decode a WAV file from disk.
pub fn read_wav_file(path: &Path) -> Result<Vec<f32>> {
    let file = std::fs::File::open(path).map_err(|e| CapscribeError::fs(path, e))?;
    read_wav(std::io::BufReader::new(file), &path.display().to_string())
}

/// Write mono samples as 16 kHz 16-bit PCM WAV.
pub fn write_wav_file(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| CapscribeError::fs(path, e))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| CapscribeError::fs(path, e))?;
    }
    writer.finalize().map_err(|e| CapscribeError::fs(path, e))
}

fn format_error(label: &str, err: hound::Error) -> CapscribeError {
    CapscribeError::AudioFormat {
        path: label.to_string(),
        expected: "PCM or float WAV".to_string(),
        actual: err.to_string(),
    }
}

fn downmix(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear interpolation resampling.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let index = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = (source_pos - index as f64) as f32;
            match samples.get(index + 1) {
                Some(&right) => samples[index] + (right - samples[index]) * fraction,
                None => samples[index],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_16khz_mono_is_scaled_only() {
        let wav = make_wav_data(16000, 1, &[0, 16384, -16384]);
        let samples = read_wav(Cursor::new(wav), "mem").unwrap();
        assert_eq!(samples, vec![0.0, 0.5, -0.5]);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let wav = make_wav_data(16000, 2, &[16384, 0, -16384, -16384]);
        let samples = read_wav(Cursor::new(wav), "mem").unwrap();
        assert_eq!(samples, vec![0.25, -0.5]);
    }

    #[test]
    fn test_48khz_is_resampled() {
        let wav = make_wav_data(48000, 1, &vec![1000i16; 48000]);
        let samples = read_wav(Cursor::new(wav), "mem").unwrap();
        assert!((15900..=16100).contains(&samples.len()));
        let expected = i16_to_f32(1000);
        assert!(samples.iter().all(|s| (s - expected).abs() < 1e-4));
    }

    #[test]
    fn test_garbage_is_audio_format_error() {
        let err = read_wav(Cursor::new(b"not a wav".to_vec()), "junk.wav").unwrap_err();
        match err {
            CapscribeError::AudioFormat { path, .. } => assert_eq!(path, "junk.wav"),
            other => panic!("expected AudioFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let tone: Vec<f32> = (0..1600).map(|i| ((i as f32) / 100.0).sin() * 0.5).collect();

        write_wav_file(&path, &tone).unwrap();
        let decoded = read_wav_file(&path).unwrap();

        assert_eq!(decoded.len(), tone.len());
        assert!(decoded.iter().zip(&tone).all(|(a, b)| (a - b).abs() < 1e-3));
    }

    #[test]
    fn test_missing_file_is_fs_error() {
        let err = read_wav_file(Path::new("/nonexistent/chunk.wav")).unwrap_err();
        assert!(matches!(err, CapscribeError::FileSystemFailure { .. }));
    }
}
