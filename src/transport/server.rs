//! WebSocket accept loop of the recognition server.
//!
//! Each accepted socket gets a fresh id that is registered in the live set
//! for as long as the socket is open. Client messages become [`Task`]s on the
//! bounded inbound queue; results coming back from the dispatcher are routed
//! to the socket they belong to.

use super::negotiate_subprotocol;
use crate::defaults;
use crate::dispatcher::LiveSet;
use crate::error::{CapscribeError, Result};
use crate::protocol::{ClientMessage, ServerMessage, SocketId, Task};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pause between attempts to enqueue into a full inbound queue.
const ENQUEUE_RETRY: Duration = Duration::from_millis(10);

/// A message the dispatcher wants delivered to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub socket_id: SocketId,
    pub message: ServerMessage,
}

type Routes = Arc<Mutex<HashMap<SocketId, mpsc::Sender<ServerMessage>>>>;

struct Shared {
    live: LiveSet,
    inbound: Sender<Task>,
    routes: Routes,
}

/// Accepts client connections and bridges them to the dispatcher queues.
pub struct TranscriptionServer {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl TranscriptionServer {
    /// Bind the listening socket.
    pub async fn bind(addr: &str, live: LiveSet, inbound: Sender<Task>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CapscribeError::ConnectionFailure {
                addr: addr.to_string(),
                attempts: 1,
                message: format!("Failed to bind: {}", e),
            })?;
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                live,
                inbound,
                routes: Arc::new(Mutex::new(HashMap::new())),
            }),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the thread that forwards dispatcher output to connections.
    ///
    /// The thread exits once every sender of `outbound` is gone.
    pub fn spawn_router(
        &self,
        outbound: Receiver<ServerEvent>,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        let routes = Arc::clone(&self.shared.routes);
        std::thread::Builder::new()
            .name("capscribe-router".to_string())
            .spawn(move || route_events(outbound, routes))
    }

    /// Accept connections until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(addr = ?self.listener.local_addr().ok(), "recognition server listening");
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(handle_connection(stream, peer, shared));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("recognition server stopped accepting connections");
        Ok(())
    }
}

fn route_events(outbound: Receiver<ServerEvent>, routes: Routes) {
    for event in outbound.iter() {
        let target = routes
            .lock()
            .ok()
            .and_then(|routes| routes.get(&event.socket_id).cloned());
        match target {
            Some(sender) => {
                if sender.blocking_send(event.message).is_err() {
                    debug!(socket_id = %event.socket_id, "connection went away before delivery");
                }
            }
            None => {
                debug!(socket_id = %event.socket_id, "dropping result for closed connection");
            }
        }
    }
    debug!("result router stopped");
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    let ws = match accept_hdr_async(stream, negotiate_subprotocol).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };

    let socket_id = Uuid::new_v4();
    let (reply_tx, mut replies) = mpsc::channel::<ServerMessage>(defaults::OUTBOUND_QUEUE);
    if let Ok(mut routes) = shared.routes.lock() {
        routes.insert(socket_id, reply_tx);
    }
    shared.live.insert(socket_id);
    info!(%peer, %socket_id, "client connected");

    let (mut sink, mut source) = ws.split();
    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = submit(&shared, socket_id, text.as_str()).await {
                        warn!(%socket_id, error = %e, "rejected client message");
                        if matches!(e, CapscribeError::ConnectionClosed { .. }) {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%socket_id, error = %e, "connection read failed");
                    break;
                }
            },
            reply = replies.recv() => match reply {
                Some(message) => match message.to_json() {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::text(json)).await {
                            debug!(%socket_id, error = %e, "connection write failed");
                            break;
                        }
                    }
                    Err(e) => warn!(%socket_id, error = %e, "failed to serialize result"),
                },
                None => break,
            }
        }
    }

    shared.live.remove(&socket_id);
    if let Ok(mut routes) = shared.routes.lock() {
        routes.remove(&socket_id);
    }
    let _ = sink.close().await;
    info!(%peer, %socket_id, "client disconnected");
}

/// Terminate `task_id` with an error so its client stops waiting.
fn reject(shared: &Shared, socket_id: SocketId, task_id: &str, error: &CapscribeError) {
    let route = shared
        .routes
        .lock()
        .ok()
        .and_then(|routes| routes.get(&socket_id).cloned());
    if let Some(route) = route {
        if route
            .try_send(ServerMessage::failure(task_id, 0.0, error.to_string()))
            .is_err()
        {
            debug!(%socket_id, task_id, "could not deliver rejection");
        }
    }
}

/// Decode one client frame and enqueue it, waiting while the queue is full.
async fn submit(shared: &Shared, socket_id: SocketId, text: &str) -> Result<()> {
    let message = ClientMessage::from_json(text).map_err(|e| CapscribeError::Protocol {
        message: format!("Malformed client message: {}", e),
    })?;
    let task_id = message.task_id.clone();
    let mut task = match Task::from_message(socket_id, message) {
        Ok(task) => task,
        Err(e) => {
            reject(shared, socket_id, &task_id, &e);
            return Err(e);
        }
    };
    debug!(
        %socket_id,
        task_id = %task.task_id,
        bytes = task.payload.len(),
        is_final = task.is_final,
        "task received"
    );

    loop {
        match shared.inbound.try_send(task) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(pending)) => {
                task = pending;
                tokio::time::sleep(ENQUEUE_RETRY).await;
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(CapscribeError::ConnectionClosed {
                    message: "recognition dispatcher has stopped".to_string(),
                });
            }
        }
    }
}
