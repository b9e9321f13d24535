//! Recognition server: dispatcher, result router and accept loop wired together.

use crate::config::{EngineConfig, ServerConfig};
use crate::defaults;
use crate::dispatcher::{Dispatcher, LiveSet, PunctuationGate, PunctuatorLoader, RecognizerLoader};
use crate::error::{CapscribeError, Result};
use crate::recognizer::{load_punctuator, load_recognizer};
use crate::transport::TranscriptionServer;
use std::net::SocketAddr;
use std::thread;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Loader for the acoustic engine described by `config`.
pub fn recognizer_loader(config: &EngineConfig) -> RecognizerLoader {
    let config = config.clone();
    Box::new(move || load_recognizer(&config))
}

/// Loader for the punctuation capability, or `None` when disabled.
pub fn punctuator_loader(enabled: bool) -> Option<PunctuatorLoader> {
    enabled.then(|| Box::new(load_punctuator) as PunctuatorLoader)
}

/// A running server.
pub struct RecognitionServer {
    addr: SocketAddr,
    stop: watch::Sender<bool>,
    accept: JoinHandle<Result<()>>,
    router: thread::JoinHandle<()>,
    dispatcher: Dispatcher,
}

impl RecognitionServer {
    /// Load the acoustic model, bind `bind_addr` and start accepting.
    ///
    /// Returns once the model is loaded and the socket is listening.
    /// Punctuation keeps loading in the background.
    pub async fn start(
        bind_addr: &str,
        recognizer: RecognizerLoader,
        punctuator: Option<PunctuatorLoader>,
    ) -> Result<Self> {
        let live = LiveSet::new();
        let (task_tx, task_rx) = crossbeam_channel::bounded(defaults::TASK_QUEUE);
        let (event_tx, event_rx) = crossbeam_channel::bounded(defaults::OUTBOUND_QUEUE);

        let worker_live = live.clone();
        let dispatcher = tokio::task::spawn_blocking(move || {
            Dispatcher::start(recognizer, punctuator, task_rx, event_tx, worker_live)
        })
        .await
        .map_err(|e| CapscribeError::Other(format!("dispatcher startup panicked: {}", e)))??;

        let server = TranscriptionServer::bind(bind_addr, live, task_tx).await?;
        let addr = server.local_addr()?;
        let router = server.spawn_router(event_rx)?;
        let (stop, stop_rx) = watch::channel(false);
        let accept = tokio::spawn(server.run(stop_rx));

        Ok(Self {
            addr,
            stop,
            accept,
            router,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn punctuation(&self) -> &PunctuationGate {
        self.dispatcher.punctuation()
    }

    /// Stop accepting, let the worker finish its current task, and join everything.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            stop,
            accept,
            router,
            dispatcher,
            ..
        } = self;

        let _ = stop.send(true);
        match accept.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "accept loop ended with an error"),
            Err(e) => warn!(error = %e, "accept loop task failed"),
        }

        // The router drains until the worker drops its event sender.
        tokio::task::spawn_blocking(move || {
            let stopped = dispatcher.stop();
            if router.join().is_err() {
                warn!("result router panicked");
            }
            stopped
        })
        .await
        .map_err(|e| CapscribeError::Other(format!("server shutdown panicked: {}", e)))?
    }
}

/// Run the server until SIGINT or SIGTERM.
pub async fn run_server(config: &ServerConfig) -> Result<()> {
    info!(
        engine = ?config.engine.kind,
        punctuation = config.punctuation,
        "loading acoustic model"
    );
    let server = RecognitionServer::start(
        &config.bind_addr(),
        recognizer_loader(&config.engine),
        punctuator_loader(config.punctuation),
    )
    .await?;
    info!(addr = %server.local_addr(), "server ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                warn!(error = %e, "signal handler setup failed");
            }
            info!("received SIGTERM, shutting down");
        }
    }

    server.shutdown().await?;
    info!("server stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| CapscribeError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}
