//! Acoustic recognition and punctuation capabilities consumed by the server.

pub mod command;
pub mod mock;
pub mod punctuation;
pub mod whisper;

pub use command::CommandRecognizer;
pub use mock::{MockPunctuator, MockRecognizer};
pub use punctuation::RulePunctuator;
pub use whisper::WhisperRecognizer;

use crate::config::{EngineConfig, EngineKind};
use crate::error::{CapscribeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output of one recognition call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Start of each token in seconds, relative to the first sample passed in.
    #[serde(default)]
    pub timestamps: Vec<f64>,
}

impl Recognition {
    /// Reject results whose tokens and timestamps do not line up.
    pub fn validate(&self) -> Result<()> {
        if self.tokens.len() != self.timestamps.len() {
            return Err(CapscribeError::Recognition {
                message: format!(
                    "engine returned {} tokens but {} timestamps",
                    self.tokens.len(),
                    self.timestamps.len()
                ),
            });
        }
        Ok(())
    }
}

/// Speech recognition over 16 kHz mono f32 audio.
///
/// Implementations must be usable from the dispatcher thread.
pub trait Recognizer: Send + Sync {
    /// Recognize one buffer of audio.
    fn recognize(&self, audio: &[f32]) -> Result<Recognition>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;
}

/// Restores punctuation in recognized text.
pub trait Punctuator: Send + Sync {
    fn punctuate(&self, text: &str) -> Result<String>;
}

impl<T: Recognizer + ?Sized> Recognizer for Arc<T> {
    fn recognize(&self, audio: &[f32]) -> Result<Recognition> {
        (**self).recognize(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Build the configured acoustic engine. Blocks until the model is loaded.
pub fn load_recognizer(config: &EngineConfig) -> Result<Arc<dyn Recognizer>> {
    match config.kind {
        EngineKind::Command => Ok(Arc::new(CommandRecognizer::new(config.command.clone())?)),
        EngineKind::Whisper => Ok(Arc::new(WhisperRecognizer::new(config)?)),
    }
}

/// Build the punctuation capability.
pub fn load_punctuator() -> Result<Arc<dyn Punctuator>> {
    Ok(Arc::new(RulePunctuator::default()))
}

/// Concatenate tokens into text.
///
/// A space is inserted between two tokens only when both touching characters
/// are ASCII alphanumeric and the right token does not already start with
/// whitespace, so CJK tokens join without separators.
pub fn join_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut text = String::new();
    for token in tokens {
        let token = token.as_ref();
        let needs_space = matches!(
            (text.chars().last(), token.chars().next()),
            (Some(left), Some(right))
                if left.is_ascii_alphanumeric() && right.is_ascii_alphanumeric()
        );
        if needs_space {
            text.push(' ');
        }
        text.push_str(token);
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_tokens_latin_words_get_spaces() {
        assert_eq!(join_tokens(&["hello", "world"]), "hello world");
    }

    #[test]
    fn test_join_tokens_keeps_existing_spacing() {
        assert_eq!(join_tokens(&["hello", " world", ","]), "hello world,");
    }

    #[test]
    fn test_join_tokens_cjk_without_spaces() {
        assert_eq!(join_tokens(&["你", "好", "世", "界"]), "你好世界");
    }

    #[test]
    fn test_join_tokens_mixed() {
        assert_eq!(join_tokens(&["我", "用", "rust", "写"]), "我用rust写");
    }

    #[test]
    fn test_recognition_validate() {
        let ok = Recognition {
            text: "a".to_string(),
            tokens: vec!["a".to_string()],
            timestamps: vec![0.0],
        };
        assert!(ok.validate().is_ok());

        let bad = Recognition {
            timestamps: Vec::new(),
            ..ok
        };
        assert!(matches!(
            bad.validate(),
            Err(CapscribeError::Recognition { .. })
        ));
    }

    #[test]
    fn test_load_recognizer_command_requires_program() {
        let config = EngineConfig::default();
        assert!(matches!(
            load_recognizer(&config),
            Err(CapscribeError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_punctuator() {
        let punctuator = load_punctuator().unwrap();
        assert_eq!(punctuator.punctuate("hello").unwrap(), "Hello.");
    }
}
