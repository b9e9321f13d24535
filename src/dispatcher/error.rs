//! Failures inside the recognition station and where they are reported.

use crate::error::CapscribeError;
use thiserror::Error;
use tracing::{error, warn};

/// A station failure.
///
/// Recoverable failures skip the current task. Fatal ones stop the station,
/// and during start-up they are handed back to whoever spawned it.
#[derive(Debug, Clone, Error)]
pub enum StationError {
    #[error("task skipped: {0}")]
    Recoverable(String),
    #[error("station stopped: {0}")]
    Fatal(String),
}

impl StationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StationError::Fatal(_))
    }
}

/// A model that cannot be loaded leaves the station nothing to run.
impl From<CapscribeError> for StationError {
    fn from(error: CapscribeError) -> Self {
        StationError::Fatal(error.to_string())
    }
}

/// Receives the errors a station does not turn into task results.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, station: &str, error: &StationError);
}

/// Sends station errors to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        if error.is_fatal() {
            error!(station, %error, "recognition station failed");
        } else {
            warn!(station, %error, "recognition task skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_fatal() {
        let error = StationError::from(CapscribeError::ModelNotFound {
            path: "/models/whisper.bin".to_string(),
        });
        assert!(error.is_fatal());
        let shown = error.to_string();
        assert!(shown.starts_with("station stopped: "), "got {}", shown);
        assert!(shown.contains("/models/whisper.bin"));
    }

    #[test]
    fn test_skipped_task_is_not_fatal() {
        let error = StationError::Recoverable("window of task t1 was empty".to_string());
        assert!(!error.is_fatal());
        assert_eq!(error.to_string(), "task skipped: window of task t1 was empty");
    }

    #[test]
    fn test_log_reporter_accepts_both_kinds() {
        let reporter = LogReporter;
        reporter.report("Recognition", &StationError::Recoverable("bad window".to_string()));
        reporter.report("Recognition", &StationError::Fatal("recognizer not loaded".to_string()));
    }
}
