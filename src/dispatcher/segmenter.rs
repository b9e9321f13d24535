//! Per-task audio cache that recognizes long uploads in overlapping windows.
//!
//! A window spans `seg_overlap + seg_duration + seg_overlap` seconds. Only
//! tokens from the centre `[overlap, overlap + duration)` of each window are
//! kept (the first window keeps from 0), then the cache advances by
//! `seg_duration`. The final message flushes whatever audio remains.

use super::liveness::LiveSet;
use crate::audio::pcm::{le_bytes_to_f32, samples_to_secs, secs_to_samples};
use crate::error::{CapscribeError, Result};
use crate::protocol::{RecognitionResult, SocketId, Task, now_secs};
use crate::recognizer::{Recognition, Recognizer, join_tokens};
use std::collections::HashMap;
use tracing::debug;

/// What the segmenter produced for one task message.
#[derive(Debug, Clone, PartialEq)]
pub enum Feed {
    /// More audio is expected; `duration` seconds received so far.
    Pending { duration: f64 },
    /// The final message arrived and the task is complete.
    Complete(RecognitionResult),
    /// The message belongs to a task that already failed; nothing to report.
    Ignored,
}

/// Recognition failed; the task is terminated with this error.
#[derive(Debug)]
pub struct FeedError {
    pub task_id: String,
    pub duration: f64,
    pub error: CapscribeError,
}

#[derive(Debug)]
struct TaskCache {
    socket_id: SocketId,
    time_start: f64,
    audio: Vec<f32>,
    /// Task time, in seconds, of `audio[0]`.
    offset: f64,
    received: usize,
    windows: usize,
    tokens: Vec<String>,
    timestamps: Vec<f64>,
    untokenized_text: String,
}

impl TaskCache {
    fn new(task: &Task) -> Self {
        Self {
            socket_id: task.socket_id,
            time_start: task.time_start,
            audio: Vec::new(),
            offset: 0.0,
            received: 0,
            windows: 0,
            tokens: Vec::new(),
            timestamps: Vec::new(),
            untokenized_text: String::new(),
        }
    }

    fn duration(&self) -> f64 {
        samples_to_secs(self.received)
    }

    /// Keep tokens whose window-relative start lies in `[from, until)`.
    fn absorb(&mut self, recognition: Recognition, from: f64, until: Option<f64>) {
        if recognition.tokens.is_empty() {
            if !recognition.text.trim().is_empty() {
                if !self.untokenized_text.is_empty() {
                    self.untokenized_text.push(' ');
                }
                self.untokenized_text.push_str(recognition.text.trim());
            }
            return;
        }
        for (token, start) in recognition.tokens.into_iter().zip(recognition.timestamps) {
            let in_range = start >= from && until.is_none_or(|end| start < end);
            if in_range {
                self.tokens.push(token);
                self.timestamps.push(self.offset + start);
            }
        }
    }

    fn text(&self) -> String {
        if self.tokens.is_empty() {
            self.untokenized_text.clone()
        } else {
            join_tokens(&self.tokens)
        }
    }
}

/// Audio caches for every task currently receiving audio.
#[derive(Debug, Default)]
pub struct Segmenter {
    caches: HashMap<String, TaskCache>,
    /// Tasks that failed before their final message, with their socket.
    failed: HashMap<String, SocketId>,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks with cached audio.
    pub fn pending_tasks(&self) -> usize {
        self.caches.len()
    }

    /// Add one message of a task and recognize every complete window.
    pub fn feed(
        &mut self,
        task: Task,
        recognizer: &dyn Recognizer,
    ) -> std::result::Result<Feed, FeedError> {
        if self.failed.contains_key(&task.task_id) {
            if task.is_final {
                self.failed.remove(&task.task_id);
            }
            return Ok(Feed::Ignored);
        }

        let outcome = self.feed_cached(&task, recognizer);
        match outcome {
            Ok(feed) => Ok(feed),
            Err(error) => {
                let duration = self
                    .caches
                    .remove(&task.task_id)
                    .map(|cache| cache.duration())
                    .unwrap_or_default();
                if !task.is_final {
                    self.failed.insert(task.task_id.clone(), task.socket_id);
                }
                Err(FeedError {
                    task_id: task.task_id,
                    duration,
                    error,
                })
            }
        }
    }

    fn feed_cached(&mut self, task: &Task, recognizer: &dyn Recognizer) -> Result<Feed> {
        let cache = self
            .caches
            .entry(task.task_id.clone())
            .or_insert_with(|| TaskCache::new(task));

        let samples = le_bytes_to_f32(&task.payload);
        cache.received += samples.len();
        cache.audio.extend(samples);

        let (step, overlap, window) = window_samples(task.seg_duration, task.seg_overlap)?;
        let step_secs = samples_to_secs(step);
        let overlap_secs = samples_to_secs(overlap);

        if step > 0 {
            while cache.audio.len() >= window {
                let recognition = recognize(recognizer, &cache.audio[..window])?;
                let from = if cache.windows == 0 { 0.0 } else { overlap_secs };
                cache.absorb(recognition, from, Some(overlap_secs + step_secs));
                cache.audio.drain(..step);
                cache.offset += step_secs;
                cache.windows += 1;
                debug!(
                    task_id = %task.task_id,
                    window = cache.windows,
                    offset = cache.offset,
                    "recognized window"
                );
            }
        }

        if !task.is_final {
            return Ok(Feed::Pending {
                duration: cache.duration(),
            });
        }

        if !cache.audio.is_empty() {
            let recognition = recognize(recognizer, &cache.audio)?;
            let from = if cache.windows == 0 { 0.0 } else { overlap_secs };
            cache.absorb(recognition, from, None);
        }

        let result = RecognitionResult {
            task_id: task.task_id.clone(),
            text: cache.text(),
            tokens: cache.tokens.clone(),
            timestamps: cache.timestamps.clone(),
            time_start: cache.time_start,
            time_complete: now_secs(),
            duration: cache.duration(),
        };
        self.caches.remove(&task.task_id);
        Ok(Feed::Complete(result))
    }

    /// Forget one task.
    pub fn forget(&mut self, task_id: &str) {
        self.caches.remove(task_id);
        self.failed.remove(task_id);
    }

    /// Drop state of tasks whose connection is gone. Returns how many caches went.
    pub fn retain_live(&mut self, live: &LiveSet) -> usize {
        self.failed.retain(|_, socket_id| live.contains(socket_id));
        let before = self.caches.len();
        self.caches.retain(|_, cache| live.contains(&cache.socket_id));
        before - self.caches.len()
    }

    /// Number of failed tasks still waiting for their final message.
    pub fn failed_tasks(&self) -> usize {
        self.failed.len()
    }
}

/// Step, overlap and full window length in samples.
fn window_samples(seg_duration: f64, seg_overlap: f64) -> Result<(usize, usize, usize)> {
    let step = secs_to_samples(seg_duration);
    let overlap = secs_to_samples(seg_overlap);
    let window = overlap
        .checked_mul(2)
        .and_then(|both| both.checked_add(step))
        .ok_or_else(|| CapscribeError::Protocol {
            message: format!(
                "segment window of {}s + 2 x {}s is too large",
                seg_duration, seg_overlap
            ),
        })?;
    Ok((step, overlap, window))
}

fn recognize(recognizer: &dyn Recognizer, audio: &[f32]) -> Result<Recognition> {
    let recognition = recognizer.recognize(audio)?;
    recognition.validate()?;
    Ok(recognition)
}
