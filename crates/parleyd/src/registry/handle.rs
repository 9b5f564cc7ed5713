//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor. Every session holds one.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use parley_core::{ConnectionId, DisplayName};

use super::commands::{Admission, RegistryCommand, RegistryError, RemovalReason};
use super::endpoint::Endpoint;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let admission = registry.admit().await?;
/// registry.try_register_admitted(&admission, name, endpoint).await?;
///
/// let delivered = registry.broadcast(line, Some(&name)).await;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Capacity the actor was started with
    capacity: usize,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    /// * `capacity` - Capacity the actor enforces (informational)
    pub fn new(sender: mpsc::Sender<RegistryCommand>, capacity: usize) -> Self {
        Self { sender, capacity }
    }

    /// Returns the capacity the registry enforces.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserve a capacity slot for a new connection.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if every slot is taken
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn admit(&self) -> Result<Admission, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Admit { respond_to: tx })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Give back an admission that was not spent on a registration.
    ///
    /// This is a fire-and-forget operation. Releasing a spent admission
    /// is a no-op.
    pub async fn release(&self, admission: Admission) {
        // Fire-and-forget: ignore send errors (actor may be shutting down)
        let _ = self
            .sender
            .send(RegistryCommand::Release { admission })
            .await;
    }

    /// Register a member without a prior admission.
    ///
    /// Succeeds only if the name is free and a slot is available.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameInUse` if another member has this name
    /// - `RegistryError::RegistryFull` if the registry is at capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_register(
        &self,
        name: DisplayName,
        endpoint: Endpoint,
    ) -> Result<(), RegistryError> {
        self.register_inner(name, endpoint, None).await
    }

    /// Register a member using the slot reserved by `admission`.
    ///
    /// On success the reservation is spent. On failure it stays reserved,
    /// so the caller may retry with another name.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameInUse` if another member has this name
    /// - `RegistryError::RegistryFull` if the reservation is no longer held
    ///   and the registry is at capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn try_register_admitted(
        &self,
        admission: &Admission,
        name: DisplayName,
        endpoint: Endpoint,
    ) -> Result<(), RegistryError> {
        self.register_inner(name, endpoint, Some(admission.id()))
            .await
    }

    async fn register_inner(
        &self,
        name: DisplayName,
        endpoint: Endpoint,
        admission: Option<u64>,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Register {
                name,
                endpoint,
                admission,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Remove a member by name.
    ///
    /// Returns `true` if a member was removed. Absent names (and a stopped
    /// actor) yield `false`; this never fails.
    pub async fn unregister(&self, name: &DisplayName) -> bool {
        self.unregister_inner(name, None, RemovalReason::Explicit)
            .await
    }

    /// Remove a member only if it is still held by `owner`.
    ///
    /// Used by sessions on their way out so a stale session never removes a
    /// newer member that reused its name.
    pub async fn unregister_owned(
        &self,
        name: &DisplayName,
        owner: ConnectionId,
        reason: RemovalReason,
    ) -> bool {
        self.unregister_inner(name, Some(owner), reason).await
    }

    async fn unregister_inner(
        &self,
        name: &DisplayName,
        owner: Option<ConnectionId>,
        reason: RemovalReason,
    ) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Unregister {
                name: name.clone(),
                owner,
                reason,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Look up a member's endpoint.
    ///
    /// Returns `None` if the member doesn't exist or if communication
    /// with the actor fails.
    pub async fn lookup(&self, name: &DisplayName) -> Option<Endpoint> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Lookup {
                name: name.clone(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// List all member names, sorted.
    ///
    /// Returns an empty vector if no members are registered or if
    /// communication with the actor fails.
    pub async fn list_names(&self) -> Vec<DisplayName> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ListNames { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Number of registered members (0 if the actor is gone).
    pub async fn count(&self) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Count { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or_default()
    }

    /// Deliver one line to one member.
    ///
    /// # Errors
    ///
    /// - `RegistryError::MemberNotFound` if no live member has this name
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn unicast(
        &self,
        name: DisplayName,
        line: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Unicast {
                name,
                line: line.into(),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Deliver one line to every member except `exclude`.
    ///
    /// Best effort: returns how many members the line was queued for.
    /// Per-recipient failures are handled by the registry and never
    /// reported here.
    pub async fn broadcast(&self, line: impl Into<String>, exclude: Option<&DisplayName>) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Broadcast {
                line: line.into(),
                exclude: exclude.cloned(),
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or_default()
    }

    /// Trigger a sweep of members whose connection has closed.
    ///
    /// This is a fire-and-forget operation - it does not wait for
    /// the sweep to complete or return any result.
    pub async fn prune_closed(&self) {
        // Fire-and-forget: ignore send errors (actor may be shutting down)
        let _ = self.sender.send(RegistryCommand::PruneClosed).await;
    }

    /// Check if the actor is still running.
    ///
    /// Returns `true` if the command channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
