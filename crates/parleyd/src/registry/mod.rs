//! Client registry using Actor pattern.
//!
//! The registry is the central directory of named chat members. It receives
//! commands via a tokio mpsc channel and is the single owner of the
//! name → endpoint map, so registry operations never race each other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │    Session      │────▶│  RegistryActor  │────▶│ Member endpoints │
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   try_send(line)      │
//!         │   (mpsc channel)      │   (per member)        │
//!         ▼                       ▼                       ▼
//!   Admit/Register/         HashMap<DisplayName,     Writer task per
//!   Unicast/Broadcast        Member>                 connection
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::debug;

mod actor;
mod commands;
mod endpoint;
mod handle;

pub use actor::RegistryActor;
pub use commands::{Admission, RegistryCommand, RegistryError, RemovalReason};
pub use endpoint::{DeliveryError, Endpoint, OUTBOUND_BUFFER};
pub use handle::RegistryHandle;

/// Default maximum number of concurrent members.
pub const DEFAULT_CAPACITY: usize = 10;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Sweep interval in seconds
const PRUNE_INTERVAL_SECS: u64 = 2;

/// Spawn the registry actor and return a handle for interaction.
///
/// This function:
/// 1. Creates the command channel
/// 2. Spawns the RegistryActor on a tokio task
/// 3. Spawns a background sweep task for closed connections
/// 4. Returns a RegistryHandle for session use
///
/// Must be called from within a tokio runtime.
///
/// # Example
///
/// ```no_run
/// use parleyd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(10);
///
///     let names = handle.list_names().await;
/// }
/// ```
pub fn spawn_registry(capacity: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, capacity);
    tokio::spawn(actor.run());

    let handle = RegistryHandle::new(cmd_tx.clone(), capacity);

    spawn_prune_task(cmd_tx.downgrade());

    handle
}

/// Spawn a background task that triggers the periodic closed-endpoint sweep.
///
/// Holds only a weak sender so the actor stops once every handle is dropped.
fn spawn_prune_task(sender: mpsc::WeakSender<RegistryCommand>) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(PRUNE_INTERVAL_SECS));

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                debug!("Prune task stopping: registry handles dropped");
                break;
            };

            // Fire-and-forget sweep command
            if sender.send(RegistryCommand::PruneClosed).await.is_err() {
                debug!("Prune task stopping: registry channel closed");
                break;
            }
        }
    });
}
