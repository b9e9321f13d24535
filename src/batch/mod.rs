//! Batch transcription of long media files.
//!
//! Each file is probed, extracted or split into chunks by the media tool,
//! transcribed chunk by chunk over a fresh connection, and merged back into
//! one set of outputs with chunk times moved onto the file's timeline.

pub mod artifacts;
pub mod cleanup;
pub mod inputs;
pub mod merge;
pub mod pipeline;

pub use artifacts::MediaArtifacts;
pub use cleanup::ArtifactGuard;
pub use inputs::expand_inputs;
pub use merge::MergeState;
pub use pipeline::{BatchPipeline, BatchReport, ChunkTranscriber, FileOutcome};
