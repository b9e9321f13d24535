//! External transcoding tools: ffprobe for durations, ffmpeg for extraction and splitting.

use crate::config::BatchConfig;
use crate::defaults;
use crate::error::{CapscribeError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Lines of tool stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 5;

/// Media operations the batch pipeline needs.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Duration of `input` in seconds.
    async fn probe_duration(&self, input: &Path) -> Result<f64>;

    /// Convert all of `input` into 16 kHz mono PCM WAV at `output`.
    async fn extract(&self, input: &Path, output: &Path) -> Result<()>;

    /// Convert `input` into consecutive WAV files cut at `points` seconds.
    ///
    /// `output_pattern` holds a `%d` that is replaced by the chunk index.
    async fn split(&self, input: &Path, points: &[f64], output_pattern: &Path) -> Result<()>;
}

/// [`MediaTool`] backed by the ffmpeg and ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: String,
    ffprobe: String,
    extract_template: Vec<String>,
}

impl FfmpegTool {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, extract_template: Vec<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            extract_template,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.ffmpeg.clone(),
            config.ffprobe.clone(),
            config.extract_command.clone(),
        )
    }
}

/// Fill the input/output placeholders of an extraction template.
pub fn render_template(template: &[String], input: &Path, output: &Path) -> Vec<String> {
    let input = input.display().to_string();
    let output = output.display().to_string();
    template
        .iter()
        .map(|part| {
            part.replace(defaults::INPUT_PLACEHOLDER, &input)
                .replace(defaults::OUTPUT_PLACEHOLDER, &output)
        })
        .collect()
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Run a tool to completion. `Err` carries a message for the caller's error variant.
async fn run_tool(program: &str, args: &[String]) -> std::result::Result<Output, String> {
    debug!(program, ?args, "running media tool");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run {}: {}", program, e))?;
    if !output.status.success() {
        return Err(format!("{} exited with {}: {}", program, output.status, stderr_tail(&output)));
    }
    Ok(output)
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let failure = |message: String| CapscribeError::MediaProbeFailure {
            path: input.display().to_string(),
            message,
        };
        let args = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(input.display().to_string()))
        .collect::<Vec<_>>();

        let output = run_tool(&self.ffprobe, &args).await.map_err(failure)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = stdout.trim();
        let duration = value
            .parse::<f64>()
            .map_err(|_| failure(format!("unexpected duration '{}'", value)))?;
        if !duration.is_finite() || duration < 0.0 {
            return Err(failure(format!("unexpected duration '{}'", value)));
        }
        Ok(duration)
    }

    async fn extract(&self, input: &Path, output: &Path) -> Result<()> {
        let failure = |message: String| CapscribeError::ExtractionFailure {
            path: input.display().to_string(),
            message,
        };
        let command = render_template(&self.extract_template, input, output);
        let (program, args) = command
            .split_first()
            .ok_or_else(|| failure("extraction command is empty".to_string()))?;
        run_tool(program, args).await.map_err(failure)?;
        Ok(())
    }

    async fn split(&self, input: &Path, points: &[f64], output_pattern: &Path) -> Result<()> {
        let times = points
            .iter()
            .map(|p| format!("{}", p))
            .collect::<Vec<_>>()
            .join(",");
        let args: Vec<String> = [
            "-y",
            "-i",
            &input.display().to_string(),
            "-vn",
            "-acodec",
            "pcm_s16le",
            "-ar",
            "16000",
            "-ac",
            "1",
            "-f",
            "segment",
            "-segment_times",
            &times,
            "-reset_timestamps",
            "1",
            &output_pattern.display().to_string(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        run_tool(&self.ffmpeg, &args)
            .await
            .map_err(|message| CapscribeError::SplitFailure {
                path: input.display().to_string(),
                message,
            })?;
        Ok(())
    }
}
