//! Transcript artifacts written next to the media: `.txt`, `.merge.txt`, `.json`, `.srt`.

use crate::error::{CapscribeError, Result};
use crate::protocol::RecognitionResult;
use crate::subtitle::{self, Subtitle};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SENTENCE_ENDS: [char; 8] = ['.', '?', '!', ';', '。', '？', '！', '；'];

/// `path` with `suffix` appended to its final component (`a/b` + `.txt` → `a/b.txt`).
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Split text into one line per sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if SENTENCE_ENDS.contains(&c) {
            let line = current.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        lines.push(rest.to_string());
    }
    lines
}

/// Token timing as stored in `<stem>.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTimings {
    pub timestamps: Vec<f64>,
    pub tokens: Vec<String>,
}

/// Everything written for one stem, built in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Recognized text as received.
    pub raw_text: String,
    /// Text split into sentences.
    pub lines: Vec<String>,
    pub subtitles: Vec<Subtitle>,
    pub timings: TokenTimings,
}

impl Transcript {
    pub fn from_result(result: &RecognitionResult) -> Self {
        let lines = split_sentences(&result.text);
        let subtitles =
            subtitle::from_lines(&lines, &result.tokens, &result.timestamps, result.duration);
        Self {
            raw_text: result.text.clone(),
            lines,
            subtitles,
            timings: TokenTimings {
                timestamps: result.timestamps.clone(),
                tokens: result.tokens.clone(),
            },
        }
    }

    /// Content of `<stem>.txt`.
    pub fn text_file(&self) -> String {
        self.lines.join("\n")
    }

    /// End of the last cue, 0 without cues.
    pub fn last_subtitle_end(&self) -> f64 {
        self.subtitles.last().map(|s| s.end).unwrap_or(0.0)
    }
}

/// The four artifact paths of one stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub txt: PathBuf,
    pub merge_txt: PathBuf,
    pub json: PathBuf,
    pub srt: PathBuf,
}

impl OutputPaths {
    /// Paths for `stem`, which carries no extension (`dir/talk`).
    pub fn for_stem(stem: &Path) -> Self {
        Self {
            txt: append_suffix(stem, ".txt"),
            merge_txt: append_suffix(stem, ".merge.txt"),
            json: append_suffix(stem, ".json"),
            srt: append_suffix(stem, ".srt"),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [&self.txt, &self.merge_txt, &self.json, &self.srt]
    }

    /// Final outputs count as present when both `.txt` and `.srt` exist.
    pub fn finals_exist(&self) -> bool {
        self.txt.is_file() && self.srt.is_file()
    }

    /// Remove every artifact that exists. Failures are logged.
    pub fn remove_all(&self) {
        for path in self.all() {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove"),
            }
        }
    }

    /// Move every artifact of `self` onto `target`, removing `target`'s on failure.
    pub fn rename_to(&self, target: &OutputPaths) -> Result<()> {
        for (from, to) in self.all().into_iter().zip(target.all()) {
            if let Err(e) = fs::rename(from, to) {
                target.remove_all();
                return Err(CapscribeError::fs(from, e));
            }
        }
        Ok(())
    }
}

/// File contents of a transcript, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTranscript {
    pub txt: String,
    pub merge_txt: String,
    pub json: String,
    pub srt: String,
}

impl RenderedTranscript {
    pub fn render(transcript: &Transcript) -> Result<Self> {
        Ok(Self {
            txt: transcript.text_file(),
            merge_txt: transcript.raw_text.clone(),
            json: serde_json::to_string(&transcript.timings)?,
            srt: subtitle::compose(&transcript.subtitles),
        })
    }

    /// Write all four files. If one fails, the ones already written are removed.
    pub fn write(&self, paths: &OutputPaths) -> Result<()> {
        let contents = [&self.txt, &self.merge_txt, &self.json, &self.srt];
        for (path, content) in paths.all().into_iter().zip(contents) {
            if let Err(e) = fs::write(path, content) {
                paths.remove_all();
                return Err(CapscribeError::fs(path, e));
            }
        }
        Ok(())
    }
}

/// Render and write one result's artifacts.
pub fn write_transcript(paths: &OutputPaths, transcript: &Transcript) -> Result<()> {
    RenderedTranscript::render(transcript)?.write(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(text: &str, tokens: &[&str], timestamps: &[f64]) -> RecognitionResult {
        RecognitionResult {
            task_id: "t".to_string(),
            text: text.to_string(),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            timestamps: timestamps.to_vec(),
            time_start: 0.0,
            time_complete: 1.0,
            duration: 5.0,
        }
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two? three"),
            vec!["One.", "Two?", "three"]
        );
        assert_eq!(split_sentences("你好。世界！"), vec!["你好。", "世界！"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_append_suffix_keeps_dots_in_stem() {
        assert_eq!(
            append_suffix(Path::new("/media/talk.v2"), ".srt"),
            PathBuf::from("/media/talk.v2.srt")
        );
    }

    #[test]
    fn test_output_paths_for_stem() {
        let paths = OutputPaths::for_stem(Path::new("dir/talk_split_0"));
        assert_eq!(paths.txt, PathBuf::from("dir/talk_split_0.txt"));
        assert_eq!(paths.merge_txt, PathBuf::from("dir/talk_split_0.merge.txt"));
        assert_eq!(paths.json, PathBuf::from("dir/talk_split_0.json"));
        assert_eq!(paths.srt, PathBuf::from("dir/talk_split_0.srt"));
    }

    #[test]
    fn test_write_transcript_creates_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::for_stem(&dir.path().join("talk"));
        let transcript =
            Transcript::from_result(&result("Hi there. Bye.", &["hi", "there", "bye"], &[0.0, 0.4, 2.0]));

        write_transcript(&paths, &transcript).unwrap();

        assert_eq!(fs::read_to_string(&paths.txt).unwrap(), "Hi there.\nBye.");
        assert_eq!(fs::read_to_string(&paths.merge_txt).unwrap(), "Hi there. Bye.");
        let timings: TokenTimings =
            serde_json::from_str(&fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(timings.tokens, vec!["hi", "there", "bye"]);
        let cues = subtitle::parse(&fs::read_to_string(&paths.srt).unwrap()).unwrap();
        assert_eq!(cues.len(), 2);
        assert!(paths.finals_exist());
    }

    #[test]
    fn test_write_failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("talk");
        // A directory where the .json file should go makes that write fail.
        fs::create_dir(append_suffix(&stem, ".json")).unwrap();
        let paths = OutputPaths::for_stem(&stem);
        let transcript = Transcript::from_result(&result("hi", &["hi"], &[0.0]));

        assert!(write_transcript(&paths, &transcript).is_err());
        assert!(!paths.txt.exists());
        assert!(!paths.merge_txt.exists());
        assert!(!paths.srt.exists());
    }

    #[test]
    fn test_rename_to_moves_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let chunk = OutputPaths::for_stem(&dir.path().join("talk_temp_audio"));
        let target = OutputPaths::for_stem(&dir.path().join("talk"));
        write_transcript(&chunk, &Transcript::from_result(&result("hi", &["hi"], &[0.0]))).unwrap();

        chunk.rename_to(&target).unwrap();
        assert!(target.finals_exist());
        assert!(target.json.exists() && target.merge_txt.exists());
        assert!(!chunk.txt.exists());
    }

    #[test]
    fn test_last_subtitle_end() {
        let transcript = Transcript::from_result(&result("Hi.", &["hi"], &[1.0]));
        assert!((transcript.last_subtitle_end() - 1.3).abs() < 1e-9);
        let empty = Transcript::from_result(&result("", &[], &[]));
        assert_eq!(empty.last_subtitle_end(), 0.0);
    }
}
