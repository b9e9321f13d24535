//! Removal of intermediate artifacts. Failures are logged, never returned.

use super::artifacts::{MediaArtifacts, chunk_stem};
use crate::client::output::append_suffix;
use crate::defaults;
use crate::error::CapscribeError;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Remove one file if present. Returns whether something was removed.
pub fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed intermediate");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            let failure = CapscribeError::fs(path, e);
            warn!(error = %failure, "cleanup failed");
            false
        }
    }
}

/// Remove `stem` itself and every `<stem><suffix>` intermediate.
pub fn remove_stem_artifacts(stem: &Path) -> usize {
    let mut removed = usize::from(stem.is_file() && remove_quietly(stem));
    for suffix in defaults::INTERMEDIATE_SUFFIXES {
        if remove_quietly(&append_suffix(stem, suffix)) {
            removed += 1;
        }
    }
    removed
}

/// Remove every regular file in `dir` whose name starts with `prefix`.
pub fn sweep_prefix(dir: &Path, prefix: &str) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot list directory for cleanup");
            return 0;
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| remove_quietly(&entry.path()))
        .count()
}

/// Stale artifacts of an earlier, interrupted run.
pub fn pre_clean(artifacts: &MediaArtifacts) -> usize {
    let (dir, prefix) = artifacts.split_prefix();
    remove_stem_artifacts(&chunk_stem(&artifacts.temp_audio()))
        + remove_quietly(&artifacts.temp_audio()) as usize
        + sweep_prefix(&dir, &prefix)
}

/// Removes the intermediates of one media file when dropped.
///
/// Chunk stems are recorded before the tools that create them run, so a
/// failure at any point leaves nothing behind.
#[derive(Debug)]
pub struct ArtifactGuard {
    artifacts: MediaArtifacts,
    stems: Vec<PathBuf>,
}

impl ArtifactGuard {
    pub fn new(artifacts: &MediaArtifacts) -> Self {
        Self {
            artifacts: artifacts.clone(),
            stems: Vec::new(),
        }
    }

    pub fn record(&mut self, stem: PathBuf) {
        self.stems.push(stem);
    }

    pub fn recorded(&self) -> &[PathBuf] {
        &self.stems
    }

    fn cleanup(&mut self) -> usize {
        let mut removed: usize = self.stems.drain(..).map(|s| remove_stem_artifacts(&s)).sum();
        removed += remove_quietly(&self.artifacts.temp_audio()) as usize;
        let (dir, prefix) = self.artifacts.split_prefix();
        removed += sweep_prefix(&dir, &prefix);
        removed
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        let removed = self.cleanup();
        debug!(stem = %self.artifacts.stem.display(), removed, "intermediates cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_remove_stem_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let stem = dir.path().join("talk_split_0");
        for suffix in [".wav", ".txt", ".srt", ".json", ".merge.txt"] {
            touch(&append_suffix(&stem, suffix));
        }
        touch(&dir.path().join("talk_split_0.keep"));

        assert_eq!(remove_stem_artifacts(&stem), 5);
        assert!(dir.path().join("talk_split_0.keep").exists());
        assert_eq!(remove_stem_artifacts(&stem), 0);
    }

    #[test]
    fn test_sweep_prefix_leaves_other_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("talk_split_0.wav"));
        touch(&dir.path().join("talk_split_12.srt"));
        touch(&dir.path().join("talk.mp4"));
        touch(&dir.path().join("other_split_0.wav"));

        assert_eq!(sweep_prefix(dir.path(), "talk_split_"), 2);
        assert!(dir.path().join("talk.mp4").exists());
        assert!(dir.path().join("other_split_0.wav").exists());
    }

    #[test]
    fn test_pre_clean_removes_stale_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.mp4");
        touch(&input);
        touch(&dir.path().join("talk_temp_audio.wav"));
        touch(&dir.path().join("talk_temp_audio.txt"));
        touch(&dir.path().join("talk_split_1.wav"));
        touch(&dir.path().join("talk.srt"));

        let artifacts = MediaArtifacts::new(&input, &BatchConfig::default());
        assert_eq!(pre_clean(&artifacts), 3);
        assert!(input.exists());
        assert!(dir.path().join("talk.srt").exists());
    }

    #[test]
    fn test_guard_cleans_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.mp4");
        let artifacts = MediaArtifacts::new(&input, &BatchConfig::default());
        {
            let mut guard = ArtifactGuard::new(&artifacts);
            for i in 0..2 {
                let audio = artifacts.chunk_audio(i);
                touch(&audio);
                touch(&append_suffix(&chunk_stem(&audio), ".json"));
                guard.record(chunk_stem(&audio));
            }
            assert_eq!(guard.recorded().len(), 2);
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
