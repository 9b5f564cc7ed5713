//! TCP chat server.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Assigns each connection a unique `ConnectionId`
//! - Spawns a session task per connection
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Session     │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └────────┬────────┘
//!         │ own replies            │ chat, whispers
//!         ▼                        ▼
//! ┌──────────────────────────────────────────┐
//! │       Writer task (per connection)       │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the server keeps accepting

mod dispatch;
mod session;

pub use dispatch::{dispatch, Outcome, SessionContext};
pub use session::{serve_connection, Session, SessionError, SessionState, MAX_LINE_LENGTH};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use parley_core::ConnectionId;

use crate::registry::RegistryHandle;

/// Line-oriented TCP chat server.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,

    /// Handle to the member registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating connection ids
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds the listening socket.
    ///
    /// Binding to port 0 picks a free port; see [`ChatServer::local_addr`].
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;

        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            local_addr,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered.
    /// Sessions watch the same token and wind down on their own.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr,
            capacity = self.registry.capacity(),
            "Chat server listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let id = self.connection_counter.fetch_add(1, Ordering::Relaxed) + 1;
                            self.handle_connection(stream, peer, ConnectionId::new(id));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!("Server stopped accepting connections");
        Ok(())
    }

    /// Spawns a session task for an accepted connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection: ConnectionId) {
        debug!(connection = %connection, peer = %peer, "Accepted connection");

        if let Err(e) = stream.set_nodelay(true) {
            debug!(connection = %connection, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let registry = self.registry.clone();
        let cancel_token = self.cancel_token.clone();
        let port = self.port();

        tokio::spawn(async move {
            let name =
                serve_connection(reader, writer, registry, connection, port, cancel_token).await;

            debug!(
                connection = %connection,
                peer = %peer,
                name = ?name.as_ref().map(|n| n.as_str()),
                "Connection finished"
            );
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },
}
