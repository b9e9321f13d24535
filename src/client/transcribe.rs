//! Upload audio as one task and wait for its terminal result.

use crate::audio::pcm::f32_to_le_bytes;
use crate::audio::wav::read_wav_file;
use crate::config::ClientConfig;
use crate::error::{CapscribeError, Result};
use crate::protocol::{RecognitionResult, Source, TaskHeader, encode_upload};
use crate::transport::{ConnectOptions, Connection, connect};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Segmentation and receive settings of one kind of task.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub seg_duration: f64,
    pub seg_overlap: f64,
    pub source: Source,
    /// Longest wait for the terminal result once the upload is sent.
    pub recv_timeout: Duration,
}

impl StreamSettings {
    pub fn file(config: &ClientConfig) -> Self {
        Self {
            seg_duration: config.file_seg_duration,
            seg_overlap: config.file_seg_overlap,
            source: Source::File,
            recv_timeout: Duration::from_secs(config.recv_timeout_secs),
        }
    }

    pub fn mic(config: &ClientConfig) -> Self {
        Self {
            seg_duration: config.mic_seg_duration,
            seg_overlap: config.mic_seg_overlap,
            source: Source::Mic,
            recv_timeout: Duration::from_secs(config.recv_timeout_secs),
        }
    }

    pub fn header(&self) -> TaskHeader {
        TaskHeader::new(self.seg_duration, self.seg_overlap, self.source)
    }
}

/// Send `samples` as one task and wait for the result.
///
/// `progress` is called with the seconds of audio the server has received.
pub async fn transcribe_samples(
    connection: &mut Connection,
    samples: &[f32],
    settings: &StreamSettings,
    progress: impl FnMut(f64),
) -> Result<RecognitionResult> {
    let header = settings.header();
    let bytes = f32_to_le_bytes(samples);
    let mut sent = 0usize;
    for message in encode_upload(&header, &bytes) {
        connection.send(&message).await?;
        sent += 1;
    }
    debug!(task_id = %header.task_id, messages = sent, "upload queued");
    receive_result(connection, &header.task_id, settings.recv_timeout, progress).await
}

/// Wait for the terminal message of `task_id`.
///
/// Progress messages are reported through `progress`; messages of other
/// tasks are ignored. If the terminal message has not arrived within
/// `stall_timeout` of the call, progress or not, the connection is closed
/// and [`CapscribeError::StreamStall`] returned.
pub async fn receive_result(
    connection: &mut Connection,
    task_id: &str,
    stall_timeout: Duration,
    mut progress: impl FnMut(f64),
) -> Result<RecognitionResult> {
    let deadline = tokio::time::Instant::now() + stall_timeout;
    loop {
        let message = match tokio::time::timeout_at(deadline, connection.recv()).await {
            Ok(message) => message?,
            Err(_) => {
                connection.close().await;
                return Err(CapscribeError::StreamStall {
                    seconds: stall_timeout.as_secs(),
                });
            }
        };

        if message.task_id != task_id {
            warn!(expected = task_id, got = %message.task_id, "ignoring message of another task");
            continue;
        }
        if !message.is_final {
            progress(message.duration);
            continue;
        }
        return message.into_result();
    }
}

/// Transcribe one WAV file over its own connection.
#[derive(Debug, Clone)]
pub struct FileTranscriber {
    addr: String,
    options: ConnectOptions,
    settings: StreamSettings,
}

impl FileTranscriber {
    pub fn new(addr: impl Into<String>, options: ConnectOptions, settings: StreamSettings) -> Self {
        Self {
            addr: addr.into(),
            options,
            settings,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.server_addr(),
            ConnectOptions::with_attempts(config.connect_attempts),
            StreamSettings::file(config),
        )
    }

    /// Read `path`, connect, upload, and wait for the result.
    ///
    /// The connection is closed on every outcome.
    pub async fn transcribe(&self, path: &Path) -> Result<RecognitionResult> {
        let owned: PathBuf = path.to_path_buf();
        let samples = tokio::task::spawn_blocking(move || read_wav_file(&owned))
            .await
            .map_err(|e| CapscribeError::Other(format!("WAV reader panicked: {}", e)))??;

        let mut connection = connect(&self.addr, &self.options).await?;
        let label = path.display().to_string();
        let outcome = transcribe_samples(&mut connection, &samples, &self.settings, |secs| {
            debug!(path = %label, received = secs, "server progress");
        })
        .await;
        connection.close().await;

        let result = outcome?;
        info!(
            path = %path.display(),
            duration = result.duration,
            processing = result.processing_secs(),
            "transcribed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::le_bytes_to_f32;
    use crate::protocol::{ClientMessage, ServerMessage};
    use crate::transport::negotiate_subprotocol;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::Message;

    /// Server that answers every task with progress per message and a
    /// terminal result echoing the sample count. `stray` first sends a
    /// message of an unrelated task.
    async fn echo_server(stray: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_hdr_async(stream, negotiate_subprotocol).await.unwrap();
            let mut samples = 0usize;
            while let Some(Ok(frame)) = ws.next().await {
                let Message::Text(text) = frame else { continue };
                let message = ClientMessage::from_json(text.as_str()).unwrap();
                samples += le_bytes_to_f32(&message.payload().unwrap()).len();
                if stray {
                    let other = ServerMessage::progress("someone-else", 1.0);
                    ws.send(Message::text(other.to_json().unwrap())).await.unwrap();
                }
                let duration = samples as f64 / 16000.0;
                let reply = if message.is_final {
                    let mut done = ServerMessage::progress(&message.task_id, duration);
                    done.is_final = true;
                    done.text = Some(format!("{} samples", samples));
                    done.tokens = Some(Vec::new());
                    done.timestamps = Some(Vec::new());
                    done
                } else {
                    ServerMessage::progress(&message.task_id, duration)
                };
                ws.send(Message::text(reply.to_json().unwrap())).await.unwrap();
            }
        });
        addr
    }

    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_hdr_async(stream, negotiate_subprotocol).await.unwrap();
            while ws.next().await.is_some() {}
        });
        addr
    }

    /// Server that reports progress every 50 ms and never finishes.
    async fn trickling_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_hdr_async(stream, negotiate_subprotocol).await.unwrap();
            let task_id = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        break ClientMessage::from_json(text.as_str()).unwrap().task_id;
                    }
                    Some(Ok(_)) => continue,
                    _ => return,
                }
            };
            let mut received = 0.0;
            loop {
                received += 1.0;
                let progress = ServerMessage::progress(&task_id, received);
                if ws.send(Message::text(progress.to_json().unwrap())).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });
        addr
    }

    fn settings(timeout: Duration) -> StreamSettings {
        StreamSettings {
            seg_duration: 25.0,
            seg_overlap: 2.0,
            source: Source::File,
            recv_timeout: timeout,
        }
    }

    #[tokio::test]
    async fn test_transcribe_samples_collects_progress_and_result() {
        let addr = echo_server(true).await;
        let mut connection = connect(&addr, &ConnectOptions::default()).await.unwrap();

        // 61 s of audio spans two upload messages.
        let samples = vec![0.0f32; 16000 * 61];
        let mut seen = Vec::new();
        let result = transcribe_samples(&mut connection, &samples, &settings(Duration::from_secs(10)), |d| {
            seen.push(d)
        })
        .await
        .unwrap();

        assert_eq!(seen, vec![60.0]);
        assert_eq!(result.text, format!("{} samples", 16000 * 61));
        assert_eq!(result.duration, 61.0);
        connection.close().await;
    }

    #[tokio::test]
    async fn test_stalled_stream_closes_connection() {
        let addr = silent_server().await;
        let mut connection = connect(&addr, &ConnectOptions::default()).await.unwrap();

        let err = transcribe_samples(
            &mut connection,
            &[0.0; 160],
            &settings(Duration::from_millis(200)),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CapscribeError::StreamStall { .. }));
        assert!(!connection.probe());
    }

    #[tokio::test]
    async fn test_endless_progress_still_hits_the_receive_bound() {
        let addr = trickling_server().await;
        let mut connection = connect(&addr, &ConnectOptions::default()).await.unwrap();

        let started = tokio::time::Instant::now();
        let mut updates = 0usize;
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            transcribe_samples(
                &mut connection,
                &[0.0; 160],
                &settings(Duration::from_millis(300)),
                |_| updates += 1,
            ),
        )
        .await
        .expect("receive bound was not enforced");

        assert!(matches!(outcome, Err(CapscribeError::StreamStall { .. })));
        assert!(updates >= 2, "progress kept arriving, got {}", updates);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!connection.probe());
    }

    #[tokio::test]
    async fn test_file_transcriber_reads_wav() {
        let addr = echo_server(false).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk.wav");
        crate::audio::wav::write_wav_file(&path, &vec![0.0; 8000]).unwrap();

        let transcriber = FileTranscriber::new(addr, ConnectOptions::default(), settings(Duration::from_secs(10)));
        let result = transcriber.transcribe(&path).await.unwrap();
        assert_eq!(result.text, "8000 samples");
    }

    #[tokio::test]
    async fn test_file_transcriber_reports_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk.wav");
        crate::audio::wav::write_wav_file(&path, &[0.0; 160]).unwrap();

        let options = ConnectOptions {
            retry_delay: Duration::from_millis(10),
            ..ConnectOptions::with_attempts(2)
        };
        let transcriber = FileTranscriber::new(addr, options, settings(Duration::from_secs(1)));
        let err = transcriber.transcribe(&path).await.unwrap_err();
        assert!(matches!(err, CapscribeError::ConnectionFailure { attempts: 2, .. }));
    }
}
