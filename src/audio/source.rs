//! Blocking audio sources feeding live sessions.

use crate::audio::pcm::le_bytes_to_f32;
use crate::audio::wav::read_wav;
use crate::defaults::{BYTES_PER_SAMPLE, SAMPLE_RATE};
use crate::error::{CapscribeError, Result};
use std::io::Read;
use std::path::Path;

/// Samples per block handed out by the sources (100 ms).
pub const BLOCK_SAMPLES: usize = SAMPLE_RATE as usize / 10;

/// A source of 16 kHz mono f32 audio.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read the next block of samples. An empty block means end of input.
    fn read_samples(&mut self) -> Result<Vec<f32>>;
}

/// Audio source backed by a decoded WAV file.
pub struct WavAudioSource {
    samples: Vec<f32>,
    position: usize,
    chunk_size: usize,
}

impl WavAudioSource {
    /// Decode a WAV stream up front.
    pub fn from_reader<R: Read>(reader: R, label: &str) -> Result<Self> {
        Ok(Self::from_samples(read_wav(reader, label)?))
    }

    /// Decode a WAV file up front.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| CapscribeError::fs(path, e))?;
        Self::from_reader(std::io::BufReader::new(file), &path.display().to_string())
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self {
            samples,
            position: 0,
            chunk_size: BLOCK_SAMPLES,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Samples not yet handed out.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioSource for WavAudioSource {
    fn read_samples(&mut self) -> Result<Vec<f32>> {
        if self.position >= self.samples.len() {
            return Ok(Vec::new());
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(chunk)
    }
}

/// Raw f32 little-endian mono 16 kHz audio from any reader (e.g. stdin).
pub struct RawPcmSource<R> {
    reader: R,
    block_bytes: usize,
    carry: Vec<u8>,
    finished: bool,
}

impl<R: Read + Send> RawPcmSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            block_bytes: BLOCK_SAMPLES * BYTES_PER_SAMPLE,
            carry: Vec::new(),
            finished: false,
        }
    }
}

impl RawPcmSource<std::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin())
    }
}

impl<R: Read + Send> AudioSource for RawPcmSource<R> {
    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let mut buffer = vec![0u8; self.block_bytes];
        while !self.finished {
            let read = self.reader.read(&mut buffer)?;
            if read == 0 {
                self.finished = true;
                break;
            }
            self.carry.extend_from_slice(&buffer[..read]);
            if self.carry.len() >= BYTES_PER_SAMPLE {
                break;
            }
        }

        let whole = self.carry.len() - self.carry.len() % BYTES_PER_SAMPLE;
        let samples = le_bytes_to_f32(&self.carry[..whole]);
        self.carry.drain(..whole);
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::f32_to_le_bytes;
    use std::io::Cursor;

    #[test]
    fn test_wav_source_hands_out_blocks_until_empty() {
        let mut source = WavAudioSource::from_samples(vec![0.1; 250]).with_chunk_size(100);
        assert_eq!(source.read_samples().unwrap().len(), 100);
        assert_eq!(source.read_samples().unwrap().len(), 100);
        assert_eq!(source.remaining(), 50);
        assert_eq!(source.read_samples().unwrap().len(), 50);
        assert!(source.read_samples().unwrap().is_empty());
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn test_start_stop_are_noops() {
        let mut source = WavAudioSource::from_samples(Vec::new());
        assert!(source.start().is_ok());
        assert!(source.stop().is_ok());
    }

    #[test]
    fn test_raw_source_decodes_stream() {
        let samples: Vec<f32> = (0..4000).map(|i| i as f32 / 4000.0).collect();
        let mut source = RawPcmSource::new(Cursor::new(f32_to_le_bytes(&samples)));

        let mut decoded = Vec::new();
        loop {
            let block = source.read_samples().unwrap();
            if block.is_empty() {
                break;
            }
            decoded.extend(block);
        }
        assert_eq!(decoded, samples);
    }

    #[test]
    fn test_raw_source_drops_trailing_partial_sample() {
        let mut bytes = f32_to_le_bytes(&[0.5, 0.25]);
        bytes.extend_from_slice(&[1, 2]);
        let mut source = RawPcmSource::new(Cursor::new(bytes));
        assert_eq!(source.read_samples().unwrap(), vec![0.5, 0.25]);
        assert!(source.read_samples().unwrap().is_empty());
    }
}
