//! Order-correct merge of chunk transcripts into one file's outputs.

use crate::client::output::{RenderedTranscript, TokenTimings, Transcript};
use crate::error::Result;
use crate::subtitle::{self, Subtitle};

/// Running state of one file's merge.
///
/// Chunks must be pushed in index order. Each chunk's cues are moved by the
/// offset accumulated so far, which then advances by that chunk's last cue end.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeState {
    pub cumulative_time_offset: f64,
    pub ordered_subtitle_entries: Vec<Subtitle>,
    pub next_index: usize,
    chunk_offsets: Vec<f64>,
    text: String,
    raw_text: String,
    timings: TokenTimings,
}

impl Default for MergeState {
    fn default() -> Self {
        Self {
            cumulative_time_offset: 0.0,
            ordered_subtitle_entries: Vec::new(),
            next_index: 1,
            chunk_offsets: Vec::new(),
            text: String::new(),
            raw_text: String::new(),
            timings: TokenTimings::default(),
        }
    }
}

impl MergeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next chunk. Returns the offset its times were moved by.
    pub fn push(&mut self, chunk: &Transcript) -> f64 {
        let offset = self.cumulative_time_offset;

        for cue in &chunk.subtitles {
            self.ordered_subtitle_entries
                .push(cue.shifted(offset, self.next_index));
            self.next_index += 1;
        }

        self.text.push_str(&chunk.text_file());
        self.text.push('\n');
        self.raw_text.push_str(&chunk.raw_text);
        self.raw_text.push('\n');

        self.timings
            .tokens
            .extend(chunk.timings.tokens.iter().cloned());
        self.timings
            .timestamps
            .extend(chunk.timings.timestamps.iter().map(|t| t + offset));

        self.chunk_offsets.push(offset);
        self.cumulative_time_offset += chunk.last_subtitle_end().max(0.0);
        offset
    }

    /// Offset applied to each pushed chunk, in push order.
    pub fn chunk_offsets(&self) -> &[f64] {
        &self.chunk_offsets
    }

    /// Contents of the merged output files.
    pub fn finish(self) -> Result<RenderedTranscript> {
        Ok(RenderedTranscript {
            txt: self.text,
            merge_txt: self.raw_text,
            json: serde_json::to_string(&self.timings)?,
            srt: subtitle::compose(&self.ordered_subtitle_entries),
        })
    }
}
