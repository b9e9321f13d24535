//! Command-line interface for capscribe
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Offline speech-to-text: transcription client, batch pipeline and recognition server
#[derive(Parser, Debug)]
#[command(name = "capscribe", version, about = "Offline speech-to-text over a local recognition server")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Server host (client: where to connect, serve: where to bind)
    #[arg(long, global = true, value_name = "HOST")]
    pub addr: Option<String>,

    /// Server port
    #[arg(long, global = true, value_name = "PORT")]
    pub port: Option<u16>,
}

/// Parse a duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
pub fn parse_duration_secs(s: &str) -> Result<f64, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<f64>() {
        if secs.is_finite() && secs > 0.0 {
            return Ok(secs);
        }
        return Err(format!("duration must be positive, got {}", s));
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs_f64())
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the recognition server (foreground)
    Serve {
        /// Engine command line: receives f32le audio on stdin, prints JSON
        #[arg(long, value_name = "CMD")]
        engine_cmd: Option<String>,

        /// Whisper model file (switches to the in-process Whisper engine)
        #[arg(long, value_name = "PATH", conflicts_with = "engine_cmd")]
        model: Option<PathBuf>,

        /// Do not load the punctuation capability
        #[arg(long)]
        no_punctuation: bool,
    },

    /// Transcribe media files or directories into .txt/.srt/.json next to them
    Transcribe {
        /// Media files or directories (non-recursive)
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Split media longer than this (default: 10m). Examples: 600, 10m, 1h
        #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
        split: Option<f64>,

        /// Give up on a chunk whose result takes longer than this (default: 2h)
        #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
        timeout: Option<f64>,
    },

    /// Stream audio live and print the transcript (Ctrl-C to stop)
    ///
    /// Captures from the microphone unless --input or --stdin is given.
    Live {
        /// WAV file to stream instead of the microphone
        #[arg(long, visible_alias = "file", value_name = "WAV", conflicts_with_all = ["stdin", "device"])]
        input: Option<PathBuf>,

        /// Read raw f32le 16 kHz mono from stdin instead of the microphone
        #[arg(long, conflicts_with = "device")]
        stdin: bool,

        /// Input device name (default: PipeWire/PulseAudio, else the system default)
        #[arg(long, value_name = "NAME")]
        device: Option<String>,
    },

    /// Manage configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
