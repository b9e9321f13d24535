//! Audio handling: PCM conversion, WAV decoding and streaming sources.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod pcm;
pub mod source;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use capture::MicSource;
pub use source::{AudioSource, RawPcmSource, WavAudioSource};
