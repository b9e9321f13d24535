//! Long-media batch pipeline: probe, extract or split, transcribe chunks, merge.

use super::artifacts::{MediaArtifacts, chunk_stem};
use super::cleanup::{ArtifactGuard, pre_clean};
use super::inputs::expand_inputs;
use super::merge::MergeState;
use crate::client::FileTranscriber;
use crate::client::output::{OutputPaths, Transcript, write_transcript};
use crate::config::BatchConfig;
use crate::error::{CapscribeError, Result};
use crate::media::{ChunkPlan, MediaTool, PlanMode};
use crate::protocol::RecognitionResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Turns one chunk's audio into a recognition result.
#[async_trait]
pub trait ChunkTranscriber: Send + Sync {
    async fn transcribe_chunk(&self, audio: &Path) -> Result<RecognitionResult>;
}

#[async_trait]
impl ChunkTranscriber for FileTranscriber {
    async fn transcribe_chunk(&self, audio: &Path) -> Result<RecognitionResult> {
        self.transcribe(audio).await
    }
}

/// What happened to one media file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Transcribed { chunks: usize, outputs: OutputPaths },
    /// Final `.txt` and `.srt` already existed.
    Skipped { outputs: OutputPaths },
}

/// Per-file results of a batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub succeeded: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} transcribed, {} skipped, {} failed",
            self.succeeded.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

pub struct BatchPipeline {
    media: Arc<dyn MediaTool>,
    transcriber: Arc<dyn ChunkTranscriber>,
    config: BatchConfig,
}

impl BatchPipeline {
    pub fn new(
        media: Arc<dyn MediaTool>,
        transcriber: Arc<dyn ChunkTranscriber>,
        config: BatchConfig,
    ) -> Self {
        Self {
            media,
            transcriber,
            config,
        }
    }

    /// Process every input in order. A failing file never stops the batch.
    pub async fn run(&self, inputs: &[PathBuf], base: &Path) -> BatchReport {
        let mut report = BatchReport::default();
        let files = expand_inputs(inputs, base);
        let total = files.len();

        for (position, input) in files.into_iter().enumerate() {
            info!(file = %input.display(), position = position + 1, total, "processing");
            match self.process_file(&input).await {
                Ok(FileOutcome::Transcribed { chunks, outputs }) => {
                    info!(file = %input.display(), chunks, srt = %outputs.srt.display(), "done");
                    report.succeeded.push(input);
                }
                Ok(FileOutcome::Skipped { .. }) => {
                    info!(file = %input.display(), "outputs exist, skipped");
                    report.skipped.push(input);
                }
                Err(e) => {
                    error!(file = %input.display(), error = %e, "file failed");
                    report.failed.push((input, e.to_string()));
                }
            }
        }
        report
    }

    /// Transcribe one media file into its final outputs.
    ///
    /// Intermediates are removed on every exit path; on failure no final
    /// output is left behind.
    pub async fn process_file(&self, input: &Path) -> Result<FileOutcome> {
        let artifacts = MediaArtifacts::new(input, &self.config);
        let stale = pre_clean(&artifacts);
        if stale > 0 {
            info!(file = %input.display(), removed = stale, "removed stale intermediates");
        }
        if artifacts.finals.finals_exist() {
            return Ok(FileOutcome::Skipped {
                outputs: artifacts.finals,
            });
        }

        let mut guard = ArtifactGuard::new(&artifacts);
        let duration = self.media.probe_duration(input).await?;
        let plan = ChunkPlan::new(
            duration,
            self.config.split_duration_secs,
            self.config.min_remainder_secs,
        );
        info!(file = %input.display(), duration, chunks = plan.len(), mode = ?plan.mode, "chunk plan");

        let audio = self.prepare_chunks(input, &artifacts, &plan, &mut guard).await?;
        let chunks = self.transcribe_chunks(&audio).await?;

        if let [(only, _)] = chunks.as_slice() {
            only.rename_to(&artifacts.finals)?;
        } else {
            let mut merge = MergeState::new();
            for (_, transcript) in &chunks {
                merge.push(transcript);
            }
            merge.finish()?.write(&artifacts.finals)?;
        }

        drop(guard);
        Ok(FileOutcome::Transcribed {
            chunks: chunks.len(),
            outputs: artifacts.finals,
        })
    }

    async fn prepare_chunks(
        &self,
        input: &Path,
        artifacts: &MediaArtifacts,
        plan: &ChunkPlan,
        guard: &mut ArtifactGuard,
    ) -> Result<Vec<PathBuf>> {
        if plan.mode == PlanMode::Extract {
            let audio = artifacts.temp_audio();
            guard.record(chunk_stem(&audio));
            self.media.extract(input, &audio).await?;
            if !audio.is_file() {
                return Err(CapscribeError::ExtractionFailure {
                    path: input.display().to_string(),
                    message: format!("{} was not produced", audio.display()),
                });
            }
            return Ok(vec![audio]);
        }

        let audio: Vec<PathBuf> = (0..plan.len()).map(|i| artifacts.chunk_audio(i)).collect();
        for path in &audio {
            guard.record(chunk_stem(path));
        }
        match audio.as_slice() {
            // Nothing to cut: the remainder was folded into the only chunk.
            [only] => self.media.extract(input, only).await?,
            _ => {
                self.media
                    .split(input, &plan.split_points(), &artifacts.split_pattern())
                    .await?
            }
        }

        if let Some(missing) = audio.iter().find(|p| !p.is_file()) {
            return Err(CapscribeError::SplitFailure {
                path: input.display().to_string(),
                message: format!("expected chunk {} was not produced", missing.display()),
            });
        }
        Ok(audio)
    }

    async fn transcribe_chunks(&self, audio: &[PathBuf]) -> Result<Vec<(OutputPaths, Transcript)>> {
        let mut chunks = Vec::with_capacity(audio.len());
        for (index, path) in audio.iter().enumerate() {
            let result = self
                .transcriber
                .transcribe_chunk(path)
                .await
                .map_err(|e| {
                    warn!(index, path = %path.display(), error = %e, "chunk failed, aborting file");
                    CapscribeError::ChunkTranscriptionFailure {
                        index,
                        path: path.display().to_string(),
                        message: e.to_string(),
                    }
                })?;

            let transcript = Transcript::from_result(&result);
            let outputs = OutputPaths::for_stem(&chunk_stem(path));
            write_transcript(&outputs, &transcript)?;
            info!(
                chunk = index + 1,
                of = audio.len(),
                seconds = result.duration,
                "chunk transcribed"
            );
            chunks.push((outputs, transcript));
        }
        Ok(chunks)
    }
}
