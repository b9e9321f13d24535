//! The serial recognition worker and its startup sequence.

use super::error::{ErrorReporter, LogReporter, StationError};
use super::liveness::LiveSet;
use super::readiness::PunctuationGate;
use super::segmenter::{Feed, Segmenter};
use super::station::{RunnerOptions, Station, StationRunner};
use crate::defaults;
use crate::error::{CapscribeError, Result};
use crate::protocol::{RecognitionResult, ServerMessage, Source, Task};
use crate::recognizer::{Punctuator, Recognizer};
use crate::transport::ServerEvent;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Produces the acoustic model; runs on the worker thread.
pub type RecognizerLoader = Box<dyn FnOnce() -> Result<Arc<dyn Recognizer>> + Send>;

/// Produces the punctuation model; runs on a background thread.
pub type PunctuatorLoader = Box<dyn FnOnce() -> Result<Arc<dyn Punctuator>> + Send>;

/// Station that turns tasks into progress and terminal messages.
pub struct RecognitionStation {
    loader: Option<RecognizerLoader>,
    recognizer: Option<Arc<dyn Recognizer>>,
    live: LiveSet,
    gate: PunctuationGate,
    segmenter: Segmenter,
}

impl RecognitionStation {
    pub fn new(loader: RecognizerLoader, live: LiveSet, gate: PunctuationGate) -> Self {
        Self {
            loader: Some(loader),
            recognizer: None,
            live,
            gate,
            segmenter: Segmenter::new(),
        }
    }

    fn punctuate(&self, mut result: RecognitionResult) -> RecognitionResult {
        if let Some(punctuator) = self.gate.punctuator() {
            match punctuator.punctuate(&result.text) {
                Ok(text) => result.text = text,
                Err(e) => warn!(task_id = %result.task_id, error = %e, "punctuation failed, keeping raw text"),
            }
        }
        result
    }
}

impl Station for RecognitionStation {
    type Input = Task;
    type Output = ServerEvent;

    fn start(&mut self) -> std::result::Result<(), StationError> {
        let loader = self
            .loader
            .take()
            .ok_or_else(|| StationError::Fatal("recognizer already loaded".to_string()))?;
        let recognizer = loader()?;
        info!(model = recognizer.model_name(), "acoustic model loaded");
        self.recognizer = Some(recognizer);
        Ok(())
    }

    fn process(&mut self, task: Task) -> std::result::Result<Option<ServerEvent>, StationError> {
        let dropped = self.segmenter.retain_live(&self.live);
        if dropped > 0 {
            debug!(dropped, "discarded audio of closed connections");
        }

        if !self.live.contains(&task.socket_id) {
            debug!(task_id = %task.task_id, socket_id = %task.socket_id, "dropping task for closed connection");
            self.segmenter.forget(&task.task_id);
            return Ok(None);
        }

        let recognizer = self
            .recognizer
            .clone()
            .ok_or_else(|| StationError::Fatal("recognizer not loaded".to_string()))?;

        let socket_id = task.socket_id;
        let source = task.source;
        let task_id = task.task_id.clone();
        let message = match self.segmenter.feed(task, recognizer.as_ref()) {
            Ok(Feed::Pending { duration }) => match source {
                Source::File => ServerMessage::progress(&task_id, duration),
                Source::Mic => return Ok(None),
            },
            Ok(Feed::Ignored) => return Ok(None),
            Ok(Feed::Complete(result)) => {
                let result = self.punctuate(result);
                info!(
                    task_id = %result.task_id,
                    duration = result.duration,
                    chars = result.text.chars().count(),
                    "task complete"
                );
                ServerMessage::terminal(&result)
            }
            Err(failure) => {
                warn!(task_id = %failure.task_id, error = %failure.error, "recognition failed");
                ServerMessage::failure(&failure.task_id, failure.duration, failure.error.to_string())
            }
        };

        Ok(Some(ServerEvent { socket_id, message }))
    }

    fn name(&self) -> &'static str {
        "Recognition"
    }

    fn shutdown(&mut self) {
        debug!(pending = self.segmenter.pending_tasks(), "recognition station stopping");
    }
}

/// Handle to the running recognition worker.
pub struct Dispatcher {
    runner: StationRunner<RecognitionStation>,
    gate: PunctuationGate,
}

impl Dispatcher {
    /// Start the worker thread and block until the acoustic model is loaded.
    ///
    /// Punctuation then loads on a background thread; until it finishes,
    /// results are delivered unpunctuated. With `punctuator` absent the gate
    /// opens immediately without a punctuator.
    pub fn start(
        recognizer: RecognizerLoader,
        punctuator: Option<PunctuatorLoader>,
        tasks: Receiver<Task>,
        events: Sender<ServerEvent>,
        live: LiveSet,
    ) -> Result<Self> {
        Self::start_with(
            recognizer,
            punctuator,
            tasks,
            events,
            live,
            defaults::DISPATCH_POLL,
            Arc::new(LogReporter),
        )
    }

    /// Like [`Dispatcher::start`] with an explicit poll interval and reporter.
    pub fn start_with(
        recognizer: RecognizerLoader,
        punctuator: Option<PunctuatorLoader>,
        tasks: Receiver<Task>,
        events: Sender<ServerEvent>,
        live: LiveSet,
        poll: Duration,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        let gate = PunctuationGate::new();
        let station = RecognitionStation::new(recognizer, live, gate.clone());
        let runner = StationRunner::spawn(station, tasks, events, reporter, RunnerOptions::new(poll))
            .map_err(|e| CapscribeError::Recognition {
                message: format!("recognition worker failed to start: {}", e),
            })?;
        info!("recognition worker ready");

        match punctuator {
            None => {
                gate.open(None);
                info!("punctuation disabled");
            }
            Some(loader) => spawn_punctuation_loader(loader, gate.clone()),
        }

        Ok(Self { runner, gate })
    }

    /// Gate that reports whether punctuation is ready.
    pub fn punctuation(&self) -> &PunctuationGate {
        &self.gate
    }

    /// Stop after the current task and wait for the worker thread.
    pub fn stop(self) -> Result<()> {
        self.runner.request_shutdown();
        self.runner
            .join()
            .map_err(CapscribeError::Other)
    }
}

fn spawn_punctuation_loader(loader: PunctuatorLoader, gate: PunctuationGate) {
    let background_gate = gate.clone();
    let spawned = std::thread::Builder::new()
        .name("capscribe-punctuation".to_string())
        .spawn(move || match loader() {
            Ok(punctuator) => {
                background_gate.open(Some(punctuator));
                info!("punctuation model loaded");
            }
            Err(e) => {
                background_gate.open(None);
                warn!(error = %e, "punctuation unavailable, results stay unpunctuated");
            }
        });
    if let Err(e) = spawned {
        gate.open(None);
        warn!(error = %e, "could not start punctuation loader");
    }
}
