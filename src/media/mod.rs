//! Media probing, extraction and splitting for the batch pipeline.

pub mod ffmpeg;
pub mod plan;

pub use ffmpeg::{FfmpegTool, MediaTool, render_template};
pub use plan::{Chunk, ChunkPlan, PlanMode};
