//! Station abstraction and its dedicated-thread runner.

use super::error::{ErrorReporter, StationError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A processing stage running in its own thread.
///
/// Stations receive input from one channel and publish output to another.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Called once on the station thread before the first input.
    ///
    /// Heavy initialization (model loading) belongs here so it happens on the
    /// thread that will use it.
    fn start(&mut self) -> Result<(), StationError> {
        Ok(())
    }

    /// Processes a single input item.
    ///
    /// Returns:
    /// - `Ok(Some(output))` - Successfully processed and produced output
    /// - `Ok(None)` - Successfully processed but no output (e.g., filtered)
    /// - `Err(StationError)` - Processing failed
    fn process(&mut self, input: Self::Input) -> Result<Option<Self::Output>, StationError>;

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// How a runner waits for input.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Upper bound on one wait for input; bounds shutdown latency.
    pub poll: Duration,
    /// Set to true to make the runner exit after the current item.
    pub shutdown: Arc<AtomicBool>,
}

impl RunnerOptions {
    pub fn new(poll: Duration) -> Self {
        Self {
            poll,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Runs a station in a dedicated thread.
pub struct StationRunner<S: Station> {
    handle: Option<JoinHandle<()>>,
    station_name: &'static str,
    shutdown: Arc<AtomicBool>,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns a station and waits until its `start` hook has completed.
    ///
    /// A failing `start` is reported, the thread is joined, and the error is
    /// returned.
    pub fn spawn(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
        options: RunnerOptions,
    ) -> Result<Self, StationError> {
        let station_name = station.name();
        let (ready_tx, ready_rx) = bounded::<Result<(), StationError>>(1);
        let shutdown = Arc::clone(&options.shutdown);

        let handle = thread::Builder::new()
            .name(format!("capscribe-{}", station_name.to_lowercase()))
            .spawn(move || {
                if let Err(e) = station.start() {
                    error_reporter.report(station_name, &e);
                    let _ = ready_tx.send(Err(e));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                Self::run_station(&mut station, input_rx, output_tx, error_reporter, options);
            })
            .map_err(|e| StationError::Fatal(format!("failed to spawn {}: {}", station_name, e)))?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(StationError::Fatal(format!(
                "{} thread exited during start",
                station_name
            )))
        });
        if let Err(e) = started {
            let _ = handle.join();
            return Err(e);
        }

        Ok(Self {
            handle: Some(handle),
            station_name,
            shutdown,
            _phantom: PhantomData,
        })
    }

    /// Main processing loop for the station.
    fn run_station(
        station: &mut S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
        options: RunnerOptions,
    ) {
        let station_name = station.name();

        while !options.shutdown.load(Ordering::SeqCst) {
            let input = match input_rx.recv_timeout(options.poll) {
                Ok(input) => input,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            match station.process(input) {
                Ok(Some(output)) => {
                    if output_tx.send(output).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(StationError::Recoverable(msg)) => {
                    error_reporter.report(station_name, &StationError::Recoverable(msg));
                }
                Err(StationError::Fatal(msg)) => {
                    error_reporter.report(station_name, &StationError::Fatal(msg));
                    break;
                }
            }
        }

        station.shutdown();
    }

    /// Ask the station to stop after the current item.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> Result<(), String> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| format!("Station '{}' thread panicked", self.station_name))
        } else {
            Ok(())
        }
    }

    /// Returns the name of the station.
    pub fn name(&self) -> &'static str {
        self.station_name
    }
}
