//! Send-endpoints for member connections.
//!
//! An `Endpoint` is the sending side of a connection's outbound line queue.
//! The session owns the connection; the registry only keeps a clone of the
//! endpoint so other sessions can reach it. When the connection's writer
//! task goes away the queue closes and every clone reports `Closed`.

use parley_core::ConnectionId;
use thiserror::Error;
use tokio::sync::mpsc;

/// Outbound queue depth per connection.
pub const OUTBOUND_BUFFER: usize = 256;

/// Addressable sink for one connection's outbound lines.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Connection this endpoint delivers to
    connection: ConnectionId,

    /// Outbound line queue drained by the connection's writer task
    sender: mpsc::Sender<String>,
}

impl Endpoint {
    /// Wraps an existing outbound queue sender.
    pub fn new(connection: ConnectionId, sender: mpsc::Sender<String>) -> Self {
        Self { connection, sender }
    }

    /// Creates an endpoint together with the receiving half of its queue.
    pub fn channel(connection: ConnectionId) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        (Self::new(connection, tx), rx)
    }

    /// Returns the connection this endpoint belongs to.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Queues a line without waiting.
    ///
    /// Used for deliveries on behalf of other sessions, which must never
    /// block on a slow recipient.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::Full` if the queue has no free slot (line dropped)
    /// - `DeliveryError::Closed` if the connection is gone
    pub fn deliver(&self, line: impl Into<String>) -> Result<(), DeliveryError> {
        self.sender.try_send(line.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Queues a line, waiting for a free slot.
    ///
    /// Used by a session for its own replies.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::Closed` if the connection is gone
    pub async fn send(&self, line: impl Into<String>) -> Result<(), DeliveryError> {
        self.sender
            .send(line.into())
            .await
            .map_err(|_| DeliveryError::Closed)
    }

    /// Returns `true` once the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Completes when the writer side goes away.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }

    /// Returns `true` if both endpoints feed the same queue.
    pub fn same_channel(&self, other: &Endpoint) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

/// Why a line could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,

    #[error("connection closed")]
    Closed,
}
