//! JSON message schema exchanged between transcription client and server.

use crate::defaults;
use crate::error::{CapscribeError, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier the server assigns to each accepted connection.
pub type SocketId = Uuid;

/// Where the audio of a task comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Live capture; the server stays silent until the terminal result.
    Mic,
    /// File upload; the server reports progress after every window.
    File,
}

/// One audio window of a task, sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub task_id: String,
    pub seg_duration: f64,
    pub seg_overlap: f64,
    pub is_final: bool,
    pub time_start: f64,
    pub time_frame: f64,
    pub source: Source,
    /// Base64 of f32 little-endian mono 16 kHz samples.
    pub data: String,
}

impl ClientMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Decode the inline audio payload.
    pub fn payload(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| CapscribeError::Protocol {
                message: format!("Invalid base64 audio payload: {}", e),
            })
    }
}

/// Progress or terminal message sent by the server.
///
/// Progress messages carry only `task_id`, `duration` and `is_final = false`;
/// the terminal message carries the full recognition result, or `error` when
/// inference failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub task_id: String,
    /// Seconds of task audio received so far.
    pub duration: f64,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_complete: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    /// Progress update for a task that is still receiving audio.
    pub fn progress(task_id: &str, duration: f64) -> Self {
        Self {
            task_id: task_id.to_string(),
            duration,
            is_final: false,
            text: None,
            tokens: None,
            timestamps: None,
            time_start: None,
            time_complete: None,
            error: None,
        }
    }

    /// Terminal message carrying a recognition result.
    pub fn terminal(result: &RecognitionResult) -> Self {
        Self {
            task_id: result.task_id.clone(),
            duration: result.duration,
            is_final: true,
            text: Some(result.text.clone()),
            tokens: Some(result.tokens.clone()),
            timestamps: Some(result.timestamps.clone()),
            time_start: Some(result.time_start),
            time_complete: Some(result.time_complete),
            error: None,
        }
    }

    /// Terminal message reporting that the task could not be recognized.
    pub fn failure(task_id: &str, duration: f64, error: impl Into<String>) -> Self {
        Self {
            is_final: true,
            error: Some(error.into()),
            ..Self::progress(task_id, duration)
        }
    }

    /// Serialize message to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert a terminal message into a result.
    ///
    /// Fails for progress messages and for terminal messages that report an
    /// inference error.
    pub fn into_result(self) -> Result<RecognitionResult> {
        if !self.is_final {
            return Err(CapscribeError::Protocol {
                message: format!("Message for task {} is not terminal", self.task_id),
            });
        }
        if let Some(error) = self.error {
            return Err(CapscribeError::Recognition { message: error });
        }
        let tokens = self.tokens.unwrap_or_default();
        let timestamps = self.timestamps.unwrap_or_default();
        if tokens.len() != timestamps.len() {
            return Err(CapscribeError::Protocol {
                message: format!(
                    "Task {} has {} tokens but {} timestamps",
                    self.task_id,
                    tokens.len(),
                    timestamps.len()
                ),
            });
        }
        Ok(RecognitionResult {
            task_id: self.task_id,
            text: self.text.unwrap_or_default(),
            tokens,
            timestamps,
            time_start: self.time_start.unwrap_or_default(),
            time_complete: self.time_complete.unwrap_or_default(),
            duration: self.duration,
        })
    }
}

/// Final outcome of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub task_id: String,
    pub text: String,
    pub tokens: Vec<String>,
    /// Start time of each token, seconds from the beginning of the task audio.
    pub timestamps: Vec<f64>,
    pub time_start: f64,
    pub time_complete: f64,
    /// Seconds of audio in the task.
    pub duration: f64,
}

impl RecognitionResult {
    /// Wall-clock seconds between the first upload and completion.
    pub fn processing_secs(&self) -> f64 {
        (self.time_complete - self.time_start).max(0.0)
    }
}

/// One decoded client message, bound to the connection it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub socket_id: SocketId,
    pub seg_duration: f64,
    pub seg_overlap: f64,
    pub is_final: bool,
    pub time_start: f64,
    pub time_frame: f64,
    pub source: Source,
    pub payload: Vec<u8>,
}

impl Task {
    /// Build a task from a message received on `socket_id`.
    ///
    /// Segmentation fields must be finite and within
    /// [`defaults::MAX_SEGMENT_SECS`]; `seg_duration` must be positive.
    pub fn from_message(socket_id: SocketId, message: ClientMessage) -> Result<Self> {
        check_segment_field("seg_duration", message.seg_duration, false)?;
        check_segment_field("seg_overlap", message.seg_overlap, true)?;
        let payload = message.payload()?;
        Ok(Self {
            task_id: message.task_id,
            socket_id,
            seg_duration: message.seg_duration,
            seg_overlap: message.seg_overlap,
            is_final: message.is_final,
            time_start: message.time_start,
            time_frame: message.time_frame,
            source: message.source,
            payload,
        })
    }
}

fn check_segment_field(name: &str, value: f64, zero_allowed: bool) -> Result<()> {
    let in_range = value.is_finite()
        && value <= defaults::MAX_SEGMENT_SECS
        && (value > 0.0 || (zero_allowed && value == 0.0));
    if in_range {
        return Ok(());
    }
    Err(CapscribeError::Protocol {
        message: format!(
            "{} must be within {} seconds, got {:?}",
            name,
            defaults::MAX_SEGMENT_SECS,
            value
        ),
    })
}
