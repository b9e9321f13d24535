//! Client side: uploads, live sessions and transcript artifacts.

pub mod live;
pub mod output;
pub mod transcribe;

pub use live::run_live;
pub use output::{OutputPaths, RenderedTranscript, TokenTimings, Transcript, write_transcript};
pub use transcribe::{FileTranscriber, StreamSettings, receive_result, transcribe_samples};
