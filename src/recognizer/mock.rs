//! Scriptable recognizer and punctuator for tests.

use super::{Punctuator, Recognition, Recognizer, join_tokens};
use crate::audio::pcm::samples_to_secs;
use crate::error::{CapscribeError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Mock recognizer that spreads a fixed word list evenly over the audio.
#[derive(Debug)]
pub struct MockRecognizer {
    model_name: String,
    words: Vec<String>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockRecognizer {
    /// Create a new mock recognizer with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            words: vec!["mock".to_string(), "transcription".to_string()],
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Words produced for every non-empty buffer (split on whitespace).
    pub fn with_response(mut self, response: &str) -> Self {
        self.words = response.split_whitespace().map(str::to_string).collect();
        self
    }

    /// Make every call fail with `message`.
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `recognize` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for MockRecognizer {
    fn recognize(&self, audio: &[f32]) -> Result<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(message) = &self.failure {
            return Err(CapscribeError::Recognition {
                message: message.clone(),
            });
        }
        if audio.is_empty() || self.words.is_empty() {
            return Ok(Recognition::default());
        }

        let duration = samples_to_secs(audio.len());
        let step = duration / self.words.len() as f64;
        Ok(Recognition {
            text: join_tokens(&self.words),
            tokens: self.words.clone(),
            timestamps: (0..self.words.len()).map(|i| i as f64 * step).collect(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Mock punctuator that appends a fixed suffix.
#[derive(Debug, Clone)]
pub struct MockPunctuator {
    suffix: String,
    failure: Option<String>,
}

impl MockPunctuator {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
            failure: None,
        }
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }
}

impl Punctuator for MockPunctuator {
    fn punctuate(&self, text: &str) -> Result<String> {
        match &self.failure {
            Some(message) => Err(CapscribeError::Punctuation {
                message: message.clone(),
            }),
            None => Ok(format!("{}{}", text, self.suffix)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_spreads_words_over_duration() {
        let recognizer = MockRecognizer::new("mock").with_response("one two three four");
        let result = recognizer.recognize(&vec![0.0; 32000]).unwrap();

        assert_eq!(result.text, "one two three four");
        assert_eq!(result.timestamps, vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(recognizer.call_count(), 1);
    }

    #[test]
    fn test_mock_empty_audio_gives_empty_result() {
        let recognizer = MockRecognizer::new("mock");
        assert_eq!(recognizer.recognize(&[]).unwrap(), Recognition::default());
    }

    #[test]
    fn test_mock_failure() {
        let recognizer = MockRecognizer::new("mock").with_failure("model crashed");
        let err = recognizer.recognize(&[0.0; 10]).unwrap_err();
        assert_eq!(err.to_string(), "Recognition failed: model crashed");
        assert_eq!(recognizer.model_name(), "mock");
    }

    #[test]
    fn test_mock_punctuator() {
        assert_eq!(MockPunctuator::new("!").punctuate("hi").unwrap(), "hi!");
        assert!(MockPunctuator::new("!").with_failure("x").punctuate("hi").is_err());
    }
}
