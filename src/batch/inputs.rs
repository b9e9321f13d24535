//! Expansion of command-line inputs into media files.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Our own outputs; never treated as media.
const OUTPUT_EXTENSIONS: [&str; 3] = ["txt", "json", "srt"];

fn is_output_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| OUTPUT_EXTENSIONS.iter().any(|o| ext.eq_ignore_ascii_case(o)))
}

/// Resolve relative paths against `base`, expand directories to their
/// regular files (sorted, not recursive) and drop transcript outputs.
///
/// Paths that do not exist are kept so the failure shows up in the report.
pub fn expand_inputs(inputs: &[PathBuf], base: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        let path = if input.is_absolute() {
            input.clone()
        } else {
            base.join(input)
        };

        if path.is_dir() {
            let mut entries: Vec<PathBuf> = match fs::read_dir(&path) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file())
                    .collect(),
                Err(e) => {
                    warn!(dir = %path.display(), error = %e, "cannot list directory");
                    continue;
                }
            };
            entries.sort();
            files.extend(entries.into_iter().filter(|p| !is_output_file(p)));
        } else if !is_output_file(&path) {
            files.push(path);
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_expands_to_media_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp4", "a.wav", "a.txt", "a.SRT", "a.json"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.mp4"), b"x").unwrap();

        let files = expand_inputs(&[dir.path().to_path_buf()], Path::new("/"));
        assert_eq!(files, vec![dir.path().join("a.wav"), dir.path().join("b.mp4")]);
    }

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let files = expand_inputs(
            &[PathBuf::from("talk.mp4"), PathBuf::from("/abs/x.mkv")],
            Path::new("/work"),
        );
        assert_eq!(files, vec![PathBuf::from("/work/talk.mp4"), PathBuf::from("/abs/x.mkv")]);
    }

    #[test]
    fn test_output_files_given_directly_are_dropped() {
        let files = expand_inputs(&[PathBuf::from("/m/talk.srt")], Path::new("/"));
        assert!(files.is_empty());
    }
}
