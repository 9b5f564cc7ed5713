//! Registry actor - owns all member state and processes commands.
//!
//! The RegistryActor is the single owner of the name → endpoint map and the
//! capacity bookkeeping. It receives commands via an mpsc channel and
//! handles them one at a time, so no two registry operations ever interleave.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Reply send failures are ignored (the caller went away)

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_core::{ConnectionId, DisplayName};

use super::commands::{Admission, RegistryCommand, RegistryError, RemovalReason};
use super::endpoint::{DeliveryError, Endpoint};

// ============================================================================
// Member Entry
// ============================================================================

/// A registered member.
#[derive(Debug)]
struct Member {
    /// Send-endpoint for the member's connection (non-owning)
    endpoint: Endpoint,

    /// When the member completed the handshake
    joined_at: DateTime<Utc>,
}

impl Member {
    fn connected_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.joined_at).num_seconds()
    }
}

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all member state.
///
/// # Ownership
///
/// The actor owns:
/// - `members`: name → entry map, the set of active members
/// - `reservations`: admission ids of connections still in the handshake
///
/// # Capacity
///
/// `members.len() + reservations.len()` never exceeds `capacity`. A
/// reservation turns into a member on registration, so a named member never
/// needs a second free slot.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Maximum number of members plus pending admissions
    capacity: usize,

    /// Active members keyed by display name
    members: HashMap<DisplayName, Member>,

    /// Outstanding admission ids
    reservations: HashSet<u64>,

    /// Next admission id to hand out
    next_admission: u64,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `capacity` - Maximum number of concurrent members
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, capacity: usize) -> Self {
        Self {
            receiver,
            capacity,
            members: HashMap::new(),
            reservations: HashSet::new(),
            next_admission: 0,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!(capacity = self.capacity, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(members = self.members.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Admit { respond_to } => {
                let result = self.handle_admit();
                // Ignore send error - client may have dropped the receiver
                if let Err(Ok(admission)) = respond_to.send(result) {
                    // Nobody will ever spend or release this slot
                    self.reservations.remove(&admission.id());
                }
            }
            RegistryCommand::Release { admission } => {
                self.handle_release(admission);
            }
            RegistryCommand::Register {
                name,
                endpoint,
                admission,
                respond_to,
            } => {
                let result = self.handle_register(name, endpoint, admission);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Unregister {
                name,
                owner,
                reason,
                respond_to,
            } => {
                let removed = self.handle_unregister(&name, owner, reason);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Lookup { name, respond_to } => {
                let _ = respond_to.send(self.handle_lookup(&name));
            }
            RegistryCommand::ListNames { respond_to } => {
                let _ = respond_to.send(self.handle_list_names());
            }
            RegistryCommand::Count { respond_to } => {
                let _ = respond_to.send(self.members.len());
            }
            RegistryCommand::Unicast {
                name,
                line,
                respond_to,
            } => {
                let result = self.handle_unicast(name, line);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Broadcast {
                line,
                exclude,
                respond_to,
            } => {
                let delivered = self.handle_broadcast(&line, exclude.as_ref());
                let _ = respond_to.send(delivered);
            }
            RegistryCommand::PruneClosed => {
                self.handle_prune_closed();
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Number of slots in use (members plus pending admissions).
    fn occupied(&self) -> usize {
        self.members.len() + self.reservations.len()
    }

    /// Handles admission of a new connection.
    fn handle_admit(&mut self) -> Result<Admission, RegistryError> {
        if self.occupied() >= self.capacity {
            warn!(
                members = self.members.len(),
                pending = self.reservations.len(),
                max = self.capacity,
                "Registry is full, rejecting admission"
            );
            return Err(RegistryError::RegistryFull { max: self.capacity });
        }

        let id = self.next_admission;
        self.next_admission = self.next_admission.wrapping_add(1);
        self.reservations.insert(id);

        debug!(
            admission = id,
            occupied = self.occupied(),
            "Admission granted"
        );

        Ok(Admission::new(id))
    }

    /// Handles release of an unused admission.
    fn handle_release(&mut self, admission: Admission) {
        if self.reservations.remove(&admission.id()) {
            debug!(admission = admission.id(), "Admission released");
        }
    }

    /// Handles member registration.
    ///
    /// The duplicate-name check, the capacity check, and the insert happen in
    /// this one handler, so two concurrent registrations of the same name
    /// cannot both succeed.
    fn handle_register(
        &mut self,
        name: DisplayName,
        endpoint: Endpoint,
        admission: Option<u64>,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.members.get(&name) {
            if !existing.endpoint.is_closed() {
                debug!(name = %name, "Name already in use, rejecting registration");
                return Err(RegistryError::NameInUse(name));
            }
            // Previous holder is gone but its session hasn't unregistered yet
            self.remove_member(&name, RemovalReason::EndpointClosed);
        }

        let reserved = admission.is_some_and(|id| self.reservations.contains(&id));

        if !reserved && self.occupied() >= self.capacity {
            warn!(
                name = %name,
                current = self.occupied(),
                max = self.capacity,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull { max: self.capacity });
        }

        if let Some(id) = admission.filter(|_| reserved) {
            self.reservations.remove(&id);
        }

        let connection = endpoint.connection();
        self.members.insert(
            name.clone(),
            Member {
                endpoint,
                joined_at: Utc::now(),
            },
        );

        info!(
            name = %name,
            connection = %connection,
            total_members = self.members.len(),
            "Member registered"
        );

        Ok(())
    }

    /// Handles member removal.
    ///
    /// With an `owner`, only an entry registered by that connection is
    /// removed, so a late cleanup never evicts a newer member that reused
    /// the name.
    fn handle_unregister(
        &mut self,
        name: &DisplayName,
        owner: Option<ConnectionId>,
        reason: RemovalReason,
    ) -> bool {
        let Some(member) = self.members.get(name) else {
            debug!(name = %name, "Unregister for absent member, ignoring");
            return false;
        };

        if let Some(owner) = owner {
            if member.endpoint.connection() != owner {
                debug!(
                    name = %name,
                    owner = %owner,
                    holder = %member.endpoint.connection(),
                    "Name now held by another connection, ignoring unregister"
                );
                return false;
            }
        }

        self.remove_member(name, reason)
    }

    /// Removes a member and logs why.
    fn remove_member(&mut self, name: &DisplayName, reason: RemovalReason) -> bool {
        let Some(member) = self.members.remove(name) else {
            return false;
        };

        info!(
            name = %name,
            connection = %member.endpoint.connection(),
            reason = %reason,
            connected_secs = member.connected_secs(),
            remaining_members = self.members.len(),
            "Member removed"
        );

        true
    }

    /// Handles looking up a single member.
    fn handle_lookup(&self, name: &DisplayName) -> Option<Endpoint> {
        self.members.get(name).map(|m| m.endpoint.clone())
    }

    /// Handles listing all member names.
    fn handle_list_names(&self) -> Vec<DisplayName> {
        let mut names: Vec<DisplayName> = self.members.keys().cloned().collect();
        names.sort();
        names
    }

    /// Handles delivery of one line to one member.
    fn handle_unicast(&mut self, name: DisplayName, line: String) -> Result<(), RegistryError> {
        let result = match self.members.get(&name) {
            Some(member) => member.endpoint.deliver(line),
            None => return Err(RegistryError::MemberNotFound(name)),
        };

        match result {
            Ok(()) => Ok(()),
            Err(DeliveryError::Full) => {
                warn!(name = %name, "Outbound queue full, dropping unicast line");
                Ok(())
            }
            Err(DeliveryError::Closed) => {
                self.remove_member(&name, RemovalReason::DeliveryFailed);
                Err(RegistryError::MemberNotFound(name))
            }
        }
    }

    /// Handles delivery of one line to every member but `exclude`.
    ///
    /// A failing recipient never stops delivery to the rest; closed
    /// recipients are pruned afterwards.
    fn handle_broadcast(&mut self, line: &str, exclude: Option<&DisplayName>) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (name, member) in &self.members {
            if exclude == Some(name) {
                continue;
            }

            match member.endpoint.deliver(line) {
                Ok(()) => delivered += 1,
                Err(DeliveryError::Full) => {
                    warn!(name = %name, "Outbound queue full, dropping broadcast line");
                }
                Err(DeliveryError::Closed) => closed.push(name.clone()),
            }
        }

        for name in closed {
            self.remove_member(&name, RemovalReason::DeliveryFailed);
        }

        debug!(delivered, "Broadcast delivered");
        delivered
    }

    /// Handles the periodic sweep of closed endpoints.
    fn handle_prune_closed(&mut self) {
        let closed: Vec<DisplayName> = self
            .members
            .iter()
            .filter(|(_, m)| m.endpoint.is_closed())
            .map(|(name, _)| name.clone())
            .collect();

        if closed.is_empty() {
            return;
        }

        info!(count = closed.len(), "Pruning members with closed connections");

        for name in closed {
            self.remove_member(&name, RemovalReason::EndpointClosed);
        }
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of members currently registered.
    #[cfg(test)]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Returns the number of outstanding admissions.
    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.reservations.len()
    }
}
