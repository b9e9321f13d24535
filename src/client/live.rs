//! Live session: stream an audio source as one `mic` task.

use super::transcribe::{StreamSettings, receive_result};
use crate::audio::AudioSource;
use crate::audio::pcm::{f32_to_le_bytes, samples_to_secs};
use crate::error::{CapscribeError, Result};
use crate::protocol::RecognitionResult;
use crate::transport::Session;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Captured blocks buffered between the capture thread and the sender.
const CAPTURE_QUEUE: usize = 64;

/// Stream `source` until it ends or `cancel` resolves, then wait for the result.
///
/// Blocks are sent as they are captured. Either way the task is closed with
/// an empty final message so the server flushes what it has.
pub async fn run_live(
    source: Box<dyn AudioSource>,
    session: &mut Session,
    settings: &StreamSettings,
    cancel: impl Future<Output = ()>,
) -> Result<RecognitionResult> {
    let connection = session.connection().await?;
    let header = settings.header();
    let stop = Arc::new(AtomicBool::new(false));
    let mut blocks = spawn_capture(source, Arc::clone(&stop))?;
    info!(task_id = %header.task_id, "live session started");

    tokio::pin!(cancel);
    let mut samples_sent = 0usize;
    loop {
        tokio::select! {
            block = blocks.recv() => match block {
                Some(Ok(samples)) => {
                    samples_sent += samples.len();
                    connection
                        .send(&header.encode_segment(&f32_to_le_bytes(&samples), false))
                        .await?;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "capture failed, finishing session");
                    break;
                }
                None => {
                    debug!("audio source exhausted");
                    break;
                }
            },
            _ = &mut cancel => {
                info!("capture interrupted");
                break;
            }
        }
    }
    stop.store(true, Ordering::SeqCst);

    while let Ok(Ok(samples)) = blocks.try_recv() {
        samples_sent += samples.len();
        connection
            .send(&header.encode_segment(&f32_to_le_bytes(&samples), false))
            .await?;
    }
    connection.send(&header.encode_segment(&[], true)).await?;
    info!(seconds = samples_to_secs(samples_sent), "audio sent, waiting for result");

    receive_result(connection, &header.task_id, settings.recv_timeout, |_| {}).await
}

fn spawn_capture(
    mut source: Box<dyn AudioSource>,
    stop: Arc<AtomicBool>,
) -> Result<mpsc::Receiver<Result<Vec<f32>>>> {
    let (tx, rx) = mpsc::channel(CAPTURE_QUEUE);
    // A plain thread: a blocked stdin read must not hold up runtime shutdown.
    std::thread::Builder::new()
        .name("capscribe-capture".to_string())
        .spawn(move || {
            if let Err(e) = source.start() {
                let _ = tx.blocking_send(Err(e));
                return;
            }
            while !stop.load(Ordering::SeqCst) {
                match source.read_samples() {
                    Ok(samples) if samples.is_empty() => break,
                    Ok(samples) => {
                        if tx.blocking_send(Ok(samples)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
            if let Err(e) = source.stop() {
                warn!(error = %e, "failed to stop audio source");
            }
        })
        .map_err(|e| CapscribeError::Other(format!("failed to start capture thread: {}", e)))?;
    Ok(rx)
}
