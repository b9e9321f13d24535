//! In-process Whisper engine (requires the `whisper` feature).
//!
//! Each Whisper segment becomes one token stamped with the segment start.

use super::{Recognition, Recognizer};
use crate::config::EngineConfig;
use crate::error::{CapscribeError, Result};
use std::path::PathBuf;

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

#[cfg(feature = "whisper")]
pub struct WhisperRecognizer {
    context: Mutex<WhisperContext>,
    language: String,
    threads: Option<usize>,
    model_name: String,
}

#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperRecognizer {
    model_name: String,
}

fn model_path(config: &EngineConfig) -> Result<PathBuf> {
    let path = config
        .model_path
        .clone()
        .ok_or_else(|| CapscribeError::ConfigInvalidValue {
            key: "server.engine.model_path".to_string(),
            message: "a model path is required for the whisper engine".to_string(),
        })?;
    if !path.exists() {
        return Err(CapscribeError::ModelNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(path)
}

fn model_name(path: &std::path::Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(feature = "whisper")]
impl WhisperRecognizer {
    /// Load the model named by `config.model_path`.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        let path = model_path(config)?;
        let path_str = path.to_str().ok_or_else(|| CapscribeError::Recognition {
            message: "Invalid UTF-8 in model path".to_string(),
        })?;
        let context = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| CapscribeError::Recognition {
                message: format!("Failed to load Whisper model: {}", e),
            })?;

        Ok(Self {
            context: Mutex::new(context),
            language: config.language.clone(),
            threads: config.threads,
            model_name: model_name(&path),
        })
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperRecognizer {
    /// Validate the model path; recognition itself is unavailable in this build.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let path = model_path(config)?;
        Ok(Self {
            model_name: model_name(&path),
        })
    }
}

#[cfg(feature = "whisper")]
impl Recognizer for WhisperRecognizer {
    fn recognize(&self, audio: &[f32]) -> Result<Recognition> {
        if audio.is_empty() {
            return Ok(Recognition::default());
        }

        let context = self
            .context
            .lock()
            .map_err(|e| CapscribeError::Recognition {
                message: format!("Failed to acquire context lock: {}", e),
            })?;
        let mut state = context
            .create_state()
            .map_err(|e| CapscribeError::Recognition {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if self.language == "auto" {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.language));
        }
        if let Some(threads) = self.threads {
            params.set_n_threads(threads as i32);
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, audio)
            .map_err(|e| CapscribeError::Recognition {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let mut recognition = Recognition::default();
        for segment in state.as_iter() {
            let text = segment.to_string();
            if text.trim().is_empty() {
                continue;
            }
            // Whisper timestamps are in centiseconds.
            recognition
                .timestamps
                .push(segment.start_timestamp() as f64 / 100.0);
            recognition.text.push_str(&text);
            recognition.tokens.push(text);
        }
        recognition.text = recognition.text.trim().to_string();
        Ok(recognition)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(not(feature = "whisper"))]
impl Recognizer for WhisperRecognizer {
    fn recognize(&self, _audio: &[f32]) -> Result<Recognition> {
        Err(CapscribeError::Recognition {
            message: "Whisper support not compiled in; rebuild with --features whisper".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_path_is_config_error() {
        let config = EngineConfig::default();
        assert!(matches!(
            WhisperRecognizer::new(&config),
            Err(CapscribeError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_nonexistent_model_is_not_found() {
        let config = EngineConfig {
            model_path: Some(PathBuf::from("/nonexistent/ggml-base.bin")),
            ..EngineConfig::default()
        };
        match WhisperRecognizer::new(&config) {
            Err(CapscribeError::ModelNotFound { path }) => {
                assert_eq!(path, "/nonexistent/ggml-base.bin");
            }
            other => panic!("expected ModelNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(not(feature = "whisper"))]
    #[test]
    fn test_without_feature_recognition_reports_missing_support() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ggml-tiny.bin");
        std::fs::write(&path, b"fake").unwrap();
        let config = EngineConfig {
            model_path: Some(path),
            ..EngineConfig::default()
        };

        let recognizer = WhisperRecognizer::new(&config).unwrap();
        assert_eq!(recognizer.model_name(), "ggml-tiny");
        assert!(recognizer.recognize(&[0.0; 16]).is_err());
    }
}
