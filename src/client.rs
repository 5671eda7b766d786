//! Client struct definition
//!
//! The Hub's handle on one connected client: identity, claimed username and
//! the bounded outbound queue drained by that connection's writer task.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SendError;
use crate::message::WireMessage;
use crate::types::ClientId;

/// Connected client information
///
/// Owned exclusively by the Hub. Rooms refer to clients by `ClientId` only.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Remote address, when known
    pub peer: Option<SocketAddr>,
    /// Username (None until the first message that carries one)
    pub username: Option<String>,
    /// Hub -> writer task queue; `None` once closed
    sender: Option<mpsc::Sender<WireMessage>>,
    /// Cancels this connection's reader and writer tasks
    shutdown: CancellationToken,
}

impl Client {
    /// Create a new client with the given ID, outbound queue and connection token
    pub fn new(
        id: ClientId,
        peer: Option<SocketAddr>,
        sender: mpsc::Sender<WireMessage>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            username: None,
            sender: Some(sender),
            shutdown,
        }
    }

    /// Queue a message for this client without waiting
    ///
    /// A full queue drops the message. Never blocks the caller.
    pub fn enqueue(&self, msg: WireMessage) -> Result<(), SendError> {
        let Some(sender) = &self.sender else {
            debug!(client_id = %self.id, kind = ?msg.kind, "enqueue after close ignored");
            return Err(SendError::ChannelClosed);
        };

        match sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => {
                warn!(client_id = %self.id, kind = ?msg.kind, "outbound queue full, dropping message");
                Err(SendError::QueueFull)
            }
            Err(TrySendError::Closed(msg)) => {
                debug!(client_id = %self.id, kind = ?msg.kind, "writer gone, dropping message");
                Err(SendError::ChannelClosed)
            }
        }
    }

    /// Get the display name for this client
    ///
    /// Returns the username if set, otherwise "Unknown".
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("Unknown")
    }

    /// Set the username if none has been claimed yet
    ///
    /// Returns true when this call set it.
    pub fn claim_username(&mut self, username: &str) -> bool {
        if self.username.is_some() || username.is_empty() {
            return false;
        }
        self.username = Some(username.to_string());
        true
    }

    /// Release the outbound queue and stop the connection's tasks
    ///
    /// The writer drains what is already queued, then shuts the socket down.
    pub fn close(&mut self) {
        self.sender = None;
        self.shutdown.cancel();
    }

    /// Check whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.sender.is_none()
    }
}
