//! Microphone capture through cpal, delivered as 16 kHz mono f32 blocks.

use crate::audio::pcm::{downmix, i16_to_f32, resample};
use crate::audio::source::AudioSource;
use crate::defaults::SAMPLE_RATE;
use crate::error::{CapscribeError, Result};
use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Input devices that follow the desktop's own device selection.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse"];

/// Some PipeWire-ALSA setups accept a 16 kHz mono stream and then never call back.
const FIRST_BLOCK_WAIT: Duration = Duration::from_millis(200);

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES.iter().any(|preferred| lower.contains(preferred))
}

fn capture_error(context: &str, error: impl std::fmt::Display) -> CapscribeError {
    CapscribeError::AudioCapture {
        message: format!("{}: {}", context, error),
    }
}

/// The named input device, or the best default one.
fn find_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| capture_error("failed to enumerate input devices", e))?;

    match name {
        Some(wanted) => devices
            .into_iter()
            .find(|d| d.name().is_ok_and(|n| n == wanted))
            .ok_or_else(|| CapscribeError::AudioDeviceNotFound {
                device: wanted.to_string(),
            }),
        None => {
            if let Some(device) = devices
                .into_iter()
                .find(|d| d.name().is_ok_and(|n| is_preferred_device(&n)))
            {
                return Ok(device);
            }
            host.default_input_device()
                .ok_or_else(|| CapscribeError::AudioDeviceNotFound {
                    device: "default".to_string(),
                })
        }
    }
}

/// Build an input stream that converts every callback buffer to wire format.
fn build_converting<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    blocks: Sender<Vec<f32>>,
    convert: F,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    F: Fn(T) -> f32 + Send + 'static,
{
    let channels = config.channels as usize;
    let rate = config.sample_rate.0;
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().map(|&s| convert(s)).collect();
                let mono = downmix(&floats, channels);
                let _ = blocks.send(resample(&mono, rate, SAMPLE_RATE));
            },
            |err| warn!(error = %err, "audio stream error"),
            None,
        )
        .map_err(|e| capture_error("failed to build input stream", e))
}

/// Holds a cpal stream so the source can move to the capture thread.
struct SendableStream(cpal::Stream);

// SAFETY: the stream is only touched by the thread that owns the `MicSource`.
unsafe impl Send for SendableStream {}

/// Live microphone input.
///
/// Asks the device for 16 kHz mono first. If it refuses, or accepts and then
/// stays silent, capture falls back to the device's native format and mixes
/// down and resamples in software.
pub struct MicSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    blocks: Option<Receiver<Vec<f32>>>,
    pending: Vec<f32>,
}

impl MicSource {
    /// Open `device_name`, or the preferred default input when `None`.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        if let Ok(name) = device.name() {
            info!(device = %name, "using input device");
        }
        Ok(Self {
            device,
            stream: None,
            blocks: None,
            pending: Vec::new(),
        })
    }

    fn build_wire_stream(&self, blocks: Sender<Vec<f32>>) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };
        build_converting(&self.device, &config, blocks, |s: f32| s)
    }

    fn build_native_stream(&self, blocks: Sender<Vec<f32>>) -> Result<cpal::Stream> {
        let supported = self
            .device
            .default_input_config()
            .map_err(|e| capture_error("failed to query the default input config", e))?;
        let format = supported.sample_format();
        let config = supported.config();
        info!(
            channels = config.channels,
            rate = config.sample_rate.0,
            format = ?format,
            "capturing in the native format, converting in software"
        );

        match format {
            SampleFormat::F32 => build_converting(&self.device, &config, blocks, |s: f32| s),
            SampleFormat::I16 => build_converting(&self.device, &config, blocks, i16_to_f32),
            SampleFormat::U16 => build_converting(&self.device, &config, blocks, |s: u16| {
                (s as f32 - 32768.0) / 32768.0
            }),
            other => Err(CapscribeError::AudioCapture {
                message: format!(
                    "unsupported native sample format {:?}; try another --device",
                    other
                ),
            }),
        }
    }
}

fn play(stream: &cpal::Stream) -> Result<()> {
    stream
        .play()
        .map_err(|e| capture_error("failed to start the input stream", e))
}

impl AudioSource for MicSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (tx, rx) = unbounded();
        let (mut stream, mut native) = match self.build_wire_stream(tx.clone()) {
            Ok(stream) => (stream, false),
            Err(e) => {
                debug!(error = %e, "16 kHz mono not offered");
                (self.build_native_stream(tx.clone())?, true)
            }
        };
        play(&stream)?;

        match rx.recv_timeout(FIRST_BLOCK_WAIT) {
            Ok(first) => self.pending = first,
            Err(_) if !native => {
                debug!("no audio from the 16 kHz stream, reopening in the native format");
                drop(stream);
                while rx.try_recv().is_ok() {}
                stream = self.build_native_stream(tx.clone())?;
                play(&stream)?;
                native = true;
            }
            Err(_) => {}
        }
        debug!(native, "microphone capture started");

        self.stream = Some(SendableStream(stream));
        self.blocks = Some(rx);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .0
                .pause()
                .map_err(|e| capture_error("failed to stop the input stream", e))?;
        }
        Ok(())
    }

    /// Everything captured since the last call; blocks until there is something.
    /// After [`AudioSource::stop`] the buffered audio drains, then the source ends.
    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let blocks = self.blocks.as_ref().ok_or_else(|| CapscribeError::AudioCapture {
            message: "microphone read before start".to_string(),
        })?;

        let mut samples = std::mem::take(&mut self.pending);
        if samples.is_empty() {
            match blocks.recv() {
                Ok(block) => samples = block,
                Err(_) => return Ok(Vec::new()),
            }
        }
        for block in blocks.try_iter() {
            samples.extend(block);
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire Sound Server"));
        assert!(is_preferred_device("PulseAudio"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_unknown_device_name_is_rejected() {
        match MicSource::new(Some("NoSuchMicrophone12345")) {
            Err(CapscribeError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NoSuchMicrophone12345")
            }
            // Hosts without any audio backend fail enumeration instead.
            Err(CapscribeError::AudioCapture { .. }) => {}
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("a device with that name should not exist"),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_default_microphone_delivers_wire_audio() {
        let mut source = MicSource::new(None).unwrap();
        source.start().unwrap();
        std::thread::sleep(Duration::from_millis(300));
        let samples = source.read_samples().unwrap();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        source.stop().unwrap();
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_source_ends_after_stop() {
        let mut source = MicSource::new(None).unwrap();
        source.start().unwrap();
        source.stop().unwrap();
        while !source.read_samples().unwrap().is_empty() {}
    }
}
