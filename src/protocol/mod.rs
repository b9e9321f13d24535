//! Streaming transcription protocol shared by client and server.
//!
//! Client messages carry base64 audio windows for one task; the server answers
//! with progress messages and exactly one terminal message per task.

pub mod codec;
pub mod message;

pub use codec::{TaskHeader, Windows, decode_message, encode_upload, now_secs, split_windows};
pub use message::{ClientMessage, RecognitionResult, ServerMessage, SocketId, Source, Task};
