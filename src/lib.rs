//! capscribe - offline speech-to-text over a local recognition server
//!
//! A client streams 16 kHz audio as JSON/base64 messages over a WebSocket;
//! the server serializes recognition behind a single worker thread. Long
//! media is split into chunks, transcribed one by one and merged back.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod config;
pub mod defaults;
pub mod dispatcher;
pub mod error;
pub mod media;
pub mod protocol;
pub mod recognizer;
pub mod server;
pub mod subtitle;
pub mod transport;

// Core traits (source → server → merge)
pub use audio::AudioSource;
pub use batch::ChunkTranscriber;
pub use media::MediaTool;
pub use recognizer::{Punctuator, Recognizer};

// Pipelines
pub use batch::{BatchPipeline, BatchReport, FileOutcome};
pub use client::{FileTranscriber, StreamSettings, run_live};
pub use server::{RecognitionServer, run_server};

// Error handling
pub use error::{CapscribeError, Result};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use dispatcher::{ErrorReporter, Station, StationError};

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
