//! Registry actor commands, errors, and admission tokens.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `Admission`: Proof that a connection holds a capacity slot
//!
//! All types are designed for async message passing and follow the panic-free policy.

use parley_core::{ConnectionId, DisplayName};
use thiserror::Error;
use tokio::sync::oneshot;

use super::endpoint::Endpoint;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each request-response command carries a oneshot channel for the reply.
/// The actor handles one command at a time, so every command is atomic with
/// respect to all others.
///
/// # Usage
///
/// ```ignore
/// let (tx, rx) = oneshot::channel();
/// registry_tx.send(RegistryCommand::Lookup {
///     name,
///     respond_to: tx,
/// }).await?;
/// let endpoint = rx.await?;
/// ```
#[derive(Debug)]
pub enum RegistryCommand {
    /// Reserve a capacity slot for a newly accepted connection.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if every slot is taken
    Admit {
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<Admission, RegistryError>>,
    },

    /// Give back a reservation that was never turned into a member.
    ///
    /// Fire-and-forget. Releasing an already-spent admission is a no-op.
    Release {
        /// Reservation to release
        admission: Admission,
    },

    /// Register a member under a unique name.
    ///
    /// # Errors
    /// - `RegistryError::NameInUse` if another member has this name
    /// - `RegistryError::RegistryFull` if no slot is reserved or free
    Register {
        /// Name the member chose
        name: DisplayName,
        /// Send-endpoint for the member's connection
        endpoint: Endpoint,
        /// Reservation id held by the connection, if any
        admission: Option<u64>,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Remove a member. Absent names are a no-op.
    Unregister {
        /// Name to remove
        name: DisplayName,
        /// Only remove if the entry belongs to this connection
        owner: Option<ConnectionId>,
        /// Why the member is leaving
        reason: RemovalReason,
        /// Whether an entry was removed
        respond_to: oneshot::Sender<bool>,
    },

    /// Look up a member's endpoint.
    Lookup {
        /// Name to look up
        name: DisplayName,
        /// Channel to send the result
        respond_to: oneshot::Sender<Option<Endpoint>>,
    },

    /// List all member names, sorted.
    ListNames {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<DisplayName>>,
    },

    /// Number of registered members.
    Count {
        /// Channel to send the result
        respond_to: oneshot::Sender<usize>,
    },

    /// Deliver one line to one member.
    ///
    /// # Errors
    /// - `RegistryError::MemberNotFound` if no live member has this name
    Unicast {
        /// Recipient
        name: DisplayName,
        /// Line to deliver
        line: String,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Deliver one line to every member except `exclude`.
    Broadcast {
        /// Line to deliver
        line: String,
        /// Member that should not receive the line (the sender)
        exclude: Option<DisplayName>,
        /// Number of members the line was queued for
        respond_to: oneshot::Sender<usize>,
    },

    /// Drop members whose connection has gone away.
    ///
    /// This is a fire-and-forget command used by the sweep task.
    PruneClosed,
}

// ============================================================================
// Admission
// ============================================================================

/// A reserved capacity slot.
///
/// Handed out by the registry when a connection is admitted. Either spent by
/// a successful registration or given back with `RegistryHandle::release`.
#[must_use = "an unused admission holds a capacity slot until released"]
#[derive(Debug, PartialEq, Eq)]
pub struct Admission {
    id: u64,
}

impl Admission {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }

    /// Returns the reservation id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Uses `thiserror` for ergonomic error handling and Display implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry has reached its capacity.
    #[error("registry is full (max: {max} members)")]
    RegistryFull {
        /// Maximum number of members allowed
        max: usize,
    },

    /// Another member already uses this name.
    #[error("name already in use: {0}")]
    NameInUse(DisplayName),

    /// No member with this name.
    #[error("member not found: {0}")]
    MemberNotFound(DisplayName),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Removal Reasons
// ============================================================================

/// Reason why a member was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Removed through the public API without a more specific reason.
    Explicit,

    /// Member sent `:quit`.
    Quit,

    /// Member's connection closed or failed.
    Disconnected,

    /// A delivery from another member found the connection closed.
    DeliveryFailed,

    /// The periodic sweep found the connection closed.
    EndpointClosed,

    /// Server is shutting down.
    Shutdown,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicitly removed"),
            Self::Quit => write!(f, "quit"),
            Self::Disconnected => write!(f, "connection closed"),
            Self::DeliveryFailed => write!(f, "delivery failed"),
            Self::EndpointClosed => write!(f, "endpoint closed"),
            Self::Shutdown => write!(f, "server shutdown"),
        }
    }
}
