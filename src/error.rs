//! Error types for capscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapscribeError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Transport errors
    #[error("Could not connect to {addr} after {attempts} attempts: {message}")]
    ConnectionFailure {
        addr: String,
        attempts: u32,
        message: String,
    },

    #[error("Connection closed: {message}")]
    ConnectionClosed { message: String },

    #[error("No result received within {seconds}s; stream considered stalled")]
    StreamStall { seconds: u64 },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // Media tool errors
    #[error("Could not determine media duration of {path}: {message}")]
    MediaProbeFailure { path: String, message: String },

    #[error("Audio extraction failed for {path}: {message}")]
    ExtractionFailure { path: String, message: String },

    #[error("Audio splitting failed for {path}: {message}")]
    SplitFailure { path: String, message: String },

    #[error("Audio format mismatch in {path}: expected {expected}, got {actual}")]
    AudioFormat {
        path: String,
        expected: String,
        actual: String,
    },

    // Capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Transcription errors
    #[error("Transcription of chunk {index} ({path}) failed: {message}")]
    ChunkTranscriptionFailure {
        index: usize,
        path: String,
        message: String,
    },

    #[error("Recognition model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Recognition failed: {message}")]
    Recognition { message: String },

    #[error("Punctuation failed: {message}")]
    Punctuation { message: String },

    // Output / cleanup errors
    #[error("File system operation failed on {path}: {message}")]
    FileSystemFailure { path: String, message: String },

    #[error("Invalid subtitle data: {message}")]
    Subtitle { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl CapscribeError {
    /// Wrap an I/O failure on a specific path.
    pub fn fs(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        CapscribeError::FileSystemFailure {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, CapscribeError>;
