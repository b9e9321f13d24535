//! Names of the files derived from one media file.

use crate::client::output::{OutputPaths, append_suffix};
use crate::config::BatchConfig;
use crate::defaults;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct MediaArtifacts {
    /// Media path without its extension.
    pub stem: PathBuf,
    /// Final transcript outputs.
    pub finals: OutputPaths,
    split_suffix: String,
    temp_audio_suffix: String,
}

impl MediaArtifacts {
    pub fn new(input: &Path, config: &BatchConfig) -> Self {
        let stem = input.with_extension("");
        Self {
            finals: OutputPaths::for_stem(&stem),
            stem,
            split_suffix: config.split_suffix.clone(),
            temp_audio_suffix: config.temp_audio_suffix.clone(),
        }
    }

    /// `<stem><temp-audio-suffix>`: audio of an unsplit file.
    pub fn temp_audio(&self) -> PathBuf {
        append_suffix(&self.stem, &self.temp_audio_suffix)
    }

    /// `<stem><split-suffix><index>.wav`
    pub fn chunk_audio(&self, index: usize) -> PathBuf {
        append_suffix(
            &self.stem,
            &format!(
                "{}{}.{}",
                self.split_suffix,
                index,
                defaults::CHUNK_AUDIO_EXTENSION
            ),
        )
    }

    /// Pattern handed to the splitter, `%d` standing for the index.
    ///
    /// A literal `%` in the stem or suffix is written as `%%`.
    pub fn split_pattern(&self) -> PathBuf {
        let prefix = append_suffix(&self.stem, &self.split_suffix);
        PathBuf::from(format!(
            "{}%d.{}",
            prefix.to_string_lossy().replace('%', "%%"),
            defaults::CHUNK_AUDIO_EXTENSION
        ))
    }

    /// Directory and file-name prefix shared by every split artifact.
    pub fn split_prefix(&self) -> (PathBuf, String) {
        let dir = self
            .stem
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = self
            .stem
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        (dir, format!("{}{}", name, self.split_suffix))
    }
}

/// Stem of a chunk's transcript outputs: its audio path minus `.wav`.
pub fn chunk_stem(audio: &Path) -> PathBuf {
    let is_wav = audio
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(defaults::CHUNK_AUDIO_EXTENSION));
    if is_wav {
        audio.with_extension("")
    } else {
        audio.to_path_buf()
    }
}
