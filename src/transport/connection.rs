//! Client side of one WebSocket connection to the recognition server.

use crate::defaults;
use crate::error::{CapscribeError, Result};
use crate::protocol::{ClientMessage, ServerMessage, decode_message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// How long `close` waits for the writer to flush the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Retry, heartbeat and queueing parameters for a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub attempts: u32,
    pub connect_timeout: Duration,
    pub retry_delay: Duration,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            attempts: defaults::CONNECT_ATTEMPTS,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            retry_delay: defaults::CONNECT_RETRY_DELAY,
            ping_interval: defaults::PING_INTERVAL,
            pong_timeout: defaults::PONG_TIMEOUT,
            queue_capacity: defaults::OUTBOUND_QUEUE,
        }
    }
}

impl ConnectOptions {
    /// Defaults with a custom attempt budget.
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }
}

/// An open connection.
///
/// A reader task decodes inbound frames and a writer task drains the bounded
/// outbound queue and sends heartbeat pings. Dropping the connection aborts
/// both tasks.
pub struct Connection {
    peer: String,
    outbound: Option<mpsc::Sender<Message>>,
    inbound: mpsc::Receiver<Result<ServerMessage>>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Take ownership of an established WebSocket and start its I/O tasks.
    pub fn spawn<S>(stream: WebSocketStream<S>, peer: impl Into<String>, options: &ConnectOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, source) = stream.split();
        let open = Arc::new(AtomicBool::new(true));
        let last_seen = Arc::new(Mutex::new(Instant::now()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel(options.queue_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(options.queue_capacity.max(1));

        let reader = tokio::spawn(read_loop(
            source,
            inbound_tx,
            Arc::clone(&open),
            Arc::clone(&last_seen),
            stop_rx,
        ));
        let writer = tokio::spawn(write_loop(
            sink,
            outbound_rx,
            Heartbeat {
                last_seen,
                interval: options.ping_interval,
                timeout: options.pong_timeout,
            },
            Arc::clone(&open),
            stop_tx,
        ));

        Self {
            peer: peer.into(),
            outbound: Some(outbound_tx),
            inbound: inbound_rx,
            open,
            reader,
            writer,
        }
    }

    /// Address of the remote end.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether the connection is still usable.
    pub fn probe(&self) -> bool {
        self.outbound.is_some() && self.open.load(Ordering::SeqCst)
    }

    /// Queue one message; waits while the outbound queue is full.
    pub async fn send(&self, message: &ClientMessage) -> Result<()> {
        let json = message.to_json()?;
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| CapscribeError::ConnectionClosed {
                message: format!("connection to {} already closed", self.peer),
            })?;
        outbound
            .send(Message::text(json))
            .await
            .map_err(|_| CapscribeError::ConnectionClosed {
                message: format!("connection to {} is no longer writable", self.peer),
            })
    }

    /// Next decoded server message.
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        match self.inbound.recv().await {
            Some(decoded) => decoded,
            None => Err(CapscribeError::ConnectionClosed {
                message: format!("{} closed the connection", self.peer),
            }),
        }
    }

    /// Send a close frame and stop the I/O tasks. Safe to call repeatedly.
    pub async fn close(&mut self) {
        let Some(outbound) = self.outbound.take() else {
            return;
        };
        drop(outbound);
        if tokio::time::timeout(CLOSE_GRACE, &mut self.writer)
            .await
            .is_err()
        {
            self.writer.abort();
        }
        self.reader.abort();
        self.open.store(false, Ordering::SeqCst);
        debug!(peer = %self.peer, "connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Open a connection to `addr` (`host:port`), retrying within the attempt budget.
pub async fn connect(addr: &str, options: &ConnectOptions) -> Result<Connection> {
    let url = format!("ws://{}", addr);
    let attempts = options.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match tokio::time::timeout(options.connect_timeout, open_socket(&url)).await {
            Ok(Ok(stream)) => {
                info!(addr, attempt, "connected to recognition server");
                return Ok(Connection::spawn(stream, addr, options));
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => {
                last_error = format!(
                    "timed out after {}ms",
                    options.connect_timeout.as_millis()
                )
            }
        }
        warn!(addr, attempt, error = %last_error, "connection attempt failed");
        if attempt < attempts {
            tokio::time::sleep(options.retry_delay).await;
        }
    }

    Err(CapscribeError::ConnectionFailure {
        addr: addr.to_string(),
        attempts,
        message: last_error,
    })
}

async fn open_socket(
    url: &str,
) -> std::result::Result<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, WsError> {
    let mut request = url.into_client_request()?;
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(defaults::SUBPROTOCOL),
    );
    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

struct Heartbeat {
    last_seen: Arc<Mutex<Instant>>,
    interval: Duration,
    timeout: Duration,
}

impl Heartbeat {
    fn idle(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|seen| seen.elapsed())
            .unwrap_or_default()
    }

    fn expired(&self) -> bool {
        self.idle() > self.interval + self.timeout
    }
}

fn touch(last_seen: &Mutex<Instant>) {
    if let Ok(mut seen) = last_seen.lock() {
        *seen = Instant::now();
    }
}

async fn read_loop<St>(
    mut source: St,
    inbound: mpsc::Sender<Result<ServerMessage>>,
    open: Arc<AtomicBool>,
    last_seen: Arc<Mutex<Instant>>,
    mut stop: watch::Receiver<bool>,
) where
    St: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            frame = source.next() => frame,
            _ = stop.changed() => break,
        };
        let Some(frame) = frame else { break };
        touch(&last_seen);

        let decoded = match frame {
            Ok(Message::Text(text)) => decode_message(text.as_bytes()),
            Ok(Message::Binary(bytes)) => decode_message(&bytes),
            Ok(Message::Close(reason)) => {
                debug!(?reason, "peer closed connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "connection read failed");
                break;
            }
        };
        if inbound.send(decoded).await.is_err() {
            break;
        }
    }
    open.store(false, Ordering::SeqCst);
}

async fn write_loop<Si>(
    mut sink: Si,
    mut outbound: mpsc::Receiver<Message>,
    heartbeat: Heartbeat,
    open: Arc<AtomicBool>,
    stop: watch::Sender<bool>,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: std::fmt::Display,
{
    let start = tokio::time::Instant::now() + heartbeat.interval;
    let mut ticker = tokio::time::interval_at(start, heartbeat.interval);

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = sink.send(message).await {
                        warn!(error = %e, "connection write failed");
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if heartbeat.expired() {
                    warn!(
                        idle_secs = heartbeat.idle().as_secs(),
                        "no frames from server within heartbeat window, closing"
                    );
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                    warn!(error = %e, "heartbeat ping failed");
                    break;
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    let _ = stop.send(true);
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Source, TaskHeader};
    use crate::transport::negotiate_subprotocol;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;

    /// Server that answers every upload with a progress message.
    async fn spawn_progress_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut ws = accept_hdr_async(stream, negotiate_subprotocol)
                        .await
                        .unwrap();
                    while let Some(Ok(frame)) = ws.next().await {
                        if let Message::Text(text) = frame {
                            let upload = ClientMessage::from_json(text.as_str()).unwrap();
                            let reply = ServerMessage::progress(&upload.task_id, 1.0);
                            if ws
                                .send(Message::text(reply.to_json().unwrap()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                    }
                });
            }
        });

        (addr, accepted)
    }

    fn fast_options(attempts: u32) -> ConnectOptions {
        ConnectOptions {
            attempts,
            connect_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_millis(10),
            ..ConnectOptions::default()
        }
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_reports_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        match connect(&addr, &fast_options(2)).await {
            Err(CapscribeError::ConnectionFailure { attempts, addr: a, .. }) => {
                assert_eq!(attempts, 2);
                assert_eq!(a, addr);
            }
            Err(other) => panic!("expected ConnectionFailure, got {:?}", other),
            Ok(_) => panic!("connecting to a closed port should fail"),
        }
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (addr, _) = spawn_progress_server().await;
        let mut connection = connect(&addr, &fast_options(1)).await.unwrap();
        assert!(connection.probe());

        let header = TaskHeader::new(25.0, 2.0, Source::File);
        connection
            .send(&header.encode_segment(&[0u8; 16], false))
            .await
            .unwrap();

        let reply = connection.recv().await.unwrap();
        assert_eq!(reply.task_id, header.task_id);
        assert!(!reply.is_final);
        connection.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (addr, _) = spawn_progress_server().await;
        let mut connection = connect(&addr, &fast_options(1)).await.unwrap();

        connection.close().await;
        assert!(!connection.probe());
        connection.close().await;
        assert!(!connection.probe());

        let header = TaskHeader::new(25.0, 2.0, Source::File);
        let result = connection.send(&header.encode_segment(&[], true)).await;
        assert!(matches!(result, Err(CapscribeError::ConnectionClosed { .. })));
    }

    #[tokio::test]
    async fn test_recv_after_server_drop_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let mut ws = accept_hdr_async(stream, negotiate_subprotocol)
                    .await
                    .unwrap();
                let _ = ws.close(None).await;
            }
        });

        let mut connection = connect(&addr, &fast_options(1)).await.unwrap();
        let result = connection.recv().await;
        assert!(matches!(result, Err(CapscribeError::ConnectionClosed { .. })));
        assert!(!connection.probe());
    }

    #[tokio::test]
    async fn test_accepted_count_helper_counts_connections() {
        let (addr, accepted) = spawn_progress_server().await;
        let mut first = connect(&addr, &fast_options(1)).await.unwrap();
        let mut second = connect(&addr, &fast_options(1)).await.unwrap();
        first.close().await;
        second.close().await;
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }
}
