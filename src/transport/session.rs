//! Reusable client session holding at most one open connection.

use super::connection::{ConnectOptions, Connection, connect};
use crate::error::{CapscribeError, Result};

/// Lazily connects and reuses the connection while it stays open.
pub struct Session {
    addr: String,
    options: ConnectOptions,
    connection: Option<Connection>,
}

impl Session {
    pub fn new(addr: impl Into<String>, options: ConnectOptions) -> Self {
        Self {
            addr: addr.into(),
            options,
            connection: None,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The open connection, reconnecting if the previous one went away.
    pub async fn connection(&mut self) -> Result<&mut Connection> {
        let reusable = self.connection.as_ref().is_some_and(Connection::probe);
        if !reusable {
            if let Some(mut stale) = self.connection.take() {
                stale.close().await;
            }
            let fresh = connect(&self.addr, &self.options).await?;
            return Ok(self.connection.insert(fresh));
        }
        self.connection
            .as_mut()
            .ok_or_else(|| CapscribeError::ConnectionClosed {
                message: format!("no open connection to {}", self.addr),
            })
    }

    /// Whether a usable connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::probe)
    }

    /// Close the held connection, if any.
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
    }
}
