//! Registry of currently open client connections.

use crate::protocol::SocketId;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Set of live socket ids, shared between the accept loop and the dispatcher.
///
/// The connection layer inserts an id when a socket opens and removes it when
/// the socket closes; the dispatcher only reads.
#[derive(Debug, Clone, Default)]
pub struct LiveSet {
    inner: Arc<RwLock<HashSet<SocketId>>>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, socket_id: SocketId) {
        if let Ok(mut set) = self.inner.write() {
            set.insert(socket_id);
        }
    }

    pub fn remove(&self, socket_id: &SocketId) {
        if let Ok(mut set) = self.inner.write() {
            set.remove(socket_id);
        }
    }

    pub fn contains(&self, socket_id: &SocketId) -> bool {
        self.inner
            .read()
            .map(|set| set.contains(socket_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
