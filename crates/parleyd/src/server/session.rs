//! Per-connection session handling.
//!
//! Each accepted connection is served by `serve_connection`, which:
//! - Spawns a writer task that drains the connection's outbound queue
//! - Asks the registry for an admission slot (or sends "chat full")
//! - Runs the `:meet` handshake until a name is registered
//! - Reads lines, broadcasting chat and dispatching commands
//! - Unregisters the member on the way out
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Transport errors end this session only and are logged

use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::{ConnectionId, DisplayName, DomainError};
use parley_protocol::{ClientLine, Request, ServerLine};

use crate::registry::{
    Admission, DeliveryError, Endpoint, RegistryError, RegistryHandle, RemovalReason,
};

use super::dispatch::{dispatch, SessionContext};

/// Maximum accepted line length in bytes, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for queued lines to reach the client after a session ends
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, waiting for `:meet`
    Unidentified,
    /// Registered under a display name
    Active(DisplayName),
    /// Finished; nothing more is read
    Terminated,
}

/// Serves one client connection to completion.
///
/// Returns the display name the client held, if it ever registered.
pub async fn serve_connection<R, W>(
    reader: R,
    writer: W,
    registry: RegistryHandle,
    connection: ConnectionId,
    port: u16,
    cancel_token: CancellationToken,
) -> Option<DisplayName>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (endpoint, outbound) = Endpoint::channel(connection);
    let mut writer_task = spawn_writer(writer, outbound, connection);

    let name = match registry.admit().await {
        Ok(admission) => {
            Session::new(reader, endpoint, registry, connection, port, cancel_token)
                .run(admission)
                .await
        }
        Err(e @ RegistryError::RegistryFull { .. }) => {
            info!(connection = %connection, error = %e, "Connection rejected");
            let _ = endpoint.send(ServerLine::ChatFull.to_string()).await;
            drop(endpoint);
            None
        }
        Err(e) => {
            warn!(connection = %connection, error = %e, "Admission failed, closing connection");
            drop(endpoint);
            None
        }
    };

    // The writer exits once every endpoint clone is gone and the queue is drained
    if timeout(DRAIN_TIMEOUT, &mut writer_task).await.is_err() {
        debug!(connection = %connection, "Writer did not drain in time");
        writer_task.abort();
    }

    name
}

/// Spawns the task that writes queued lines to the client.
///
/// The task stops on the first write failure or timeout. Dropping the
/// receiver then closes the endpoint, which the registry and the session
/// both observe.
fn spawn_writer<W>(
    writer: W,
    mut outbound: mpsc::Receiver<String>,
    connection: ConnectionId,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);

        while let Some(line) = outbound.recv().await {
            let result = timeout(WRITE_TIMEOUT, async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(connection = %connection, error = %e, "Write failed");
                    break;
                }
                Err(_) => {
                    warn!(connection = %connection, "Write timed out");
                    break;
                }
            }
        }

        drop(outbound);
        let _ = timeout(WRITE_TIMEOUT, writer.shutdown()).await;
    })
}

/// One client's conversation with the server.
pub struct Session<R> {
    /// Buffered reader for incoming lines
    reader: BufReader<R>,

    /// This connection's own outbound queue
    endpoint: Endpoint,

    /// Handle to the member registry
    registry: RegistryHandle,

    /// Unique connection identifier
    connection: ConnectionId,

    /// Port reported by `:p`
    port: u16,

    /// Token for graceful shutdown
    cancel_token: CancellationToken,

    state: SessionState,
}

impl<R: AsyncRead + Unpin> Session<R> {
    /// Creates a session for an admitted connection.
    pub fn new(
        reader: R,
        endpoint: Endpoint,
        registry: RegistryHandle,
        connection: ConnectionId,
        port: u16,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            endpoint,
            registry,
            connection,
            port,
            cancel_token,
            state: SessionState::Unidentified,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs the session until the client leaves or the server shuts down.
    ///
    /// The admission slot is spent on successful registration and released
    /// if the client never gets that far.
    pub async fn run(mut self, admission: Admission) -> Option<DisplayName> {
        debug!(connection = %self.connection, "New client connected");

        let name = match self.identify(&admission).await {
            Ok(name) => name,
            Err(e) => {
                debug!(connection = %self.connection, error = %e, "Handshake ended");
                self.registry.release(admission).await;
                self.state = SessionState::Terminated;
                return None;
            }
        };

        info!(connection = %self.connection, name = %name, "Member joined");
        self.state = SessionState::Active(name.clone());

        let reason = match self.process_lines(&name).await {
            Ok(()) => RemovalReason::Quit,
            Err(SessionError::Shutdown) => RemovalReason::Shutdown,
            Err(e) => {
                debug!(name = %name, error = %e, "Connection closed");
                RemovalReason::Disconnected
            }
        };

        // No-op after :quit, which already removed the member
        self.registry
            .unregister_owned(&name, self.connection, reason)
            .await;
        self.state = SessionState::Terminated;

        info!(connection = %self.connection, name = %name, %reason, "Member left");
        Some(name)
    }

    /// Greets the client and loops on `:meet` until a name is registered.
    async fn identify(&mut self, admission: &Admission) -> Result<DisplayName, SessionError> {
        self.send(ServerLine::Welcome).await?;

        loop {
            let line = self.next_line().await?;

            let raw_name = match ClientLine::parse(&line) {
                ClientLine::Command(cmd) => match Request::try_from(&cmd) {
                    Ok(Request::Meet { name }) => name,
                    _ => {
                        self.send(ServerLine::IdentifyUsage).await?;
                        continue;
                    }
                },
                _ => {
                    self.send(ServerLine::IdentifyUsage).await?;
                    continue;
                }
            };

            let name = match DisplayName::parse(&raw_name) {
                Ok(name) => name,
                Err(DomainError::EmptyName) => {
                    self.send(ServerLine::IdentifyUsage).await?;
                    continue;
                }
                Err(DomainError::InvalidName { name, reason }) => {
                    self.send(ServerLine::InvalidName { name, reason }).await?;
                    continue;
                }
            };

            match self
                .registry
                .try_register_admitted(admission, name.clone(), self.endpoint.clone())
                .await
            {
                Ok(()) => {
                    if let Err(e) = self.send(ServerLine::Hello { name: name.clone() }).await {
                        // The admission is spent, so the name must be removed here
                        self.registry
                            .unregister_owned(&name, self.connection, RemovalReason::Disconnected)
                            .await;
                        return Err(e);
                    }
                    return Ok(name);
                }
                Err(RegistryError::NameInUse(taken)) => {
                    debug!(connection = %self.connection, name = %taken, "Name already in use");
                    self.send(ServerLine::NameInUse).await?;
                }
                Err(e @ RegistryError::RegistryFull { .. }) => {
                    self.send(ServerLine::ChatFull).await?;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Main line loop for an active member.
    ///
    /// Returns `Ok(())` when the member quits.
    async fn process_lines(&mut self, name: &DisplayName) -> Result<(), SessionError> {
        let ctx = SessionContext {
            name,
            connection: self.connection,
            port: self.port,
        };

        loop {
            let line = self.next_line().await?;

            match ClientLine::parse(&line) {
                ClientLine::Empty => {}
                ClientLine::Chat(text) => {
                    info!(name = %name, "[{name}]: {text}");
                    let delivered = self
                        .registry
                        .broadcast(ServerLine::chat(name, text).to_string(), Some(name))
                        .await;
                    debug!(name = %name, delivered, "Chat broadcast");
                }
                ClientLine::Command(cmd) => {
                    let outcome = dispatch(&ctx, &cmd, &self.registry).await;
                    self.send(outcome.reply).await?;

                    if outcome.end_session {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Waits for the next line, shutdown, or loss of the outbound side.
    async fn next_line(&mut self) -> Result<String, SessionError> {
        tokio::select! {
            _ = self.cancel_token.cancelled() => Err(SessionError::Shutdown),
            _ = self.endpoint.closed() => Err(SessionError::OutboundClosed),
            line = read_line(&mut self.reader) => line,
        }
    }

    /// Queues one of this session's own replies.
    async fn send(&self, line: ServerLine) -> Result<(), SessionError> {
        self.endpoint
            .send(line.to_string())
            .await
            .map_err(|_: DeliveryError| SessionError::OutboundClosed)
    }
}

/// Reads one line, stripping the `\n` or `\r\n` terminator.
///
/// A final line without a terminator is accepted at EOF.
async fn read_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<String, SessionError> {
    // Room for the longest allowed line plus "\r\n"
    let limit = (MAX_LINE_LENGTH + 2) as u64;
    let mut buf = String::new();

    let bytes_read = reader
        .take(limit)
        .read_line(&mut buf)
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?;

    if bytes_read == 0 {
        return Err(SessionError::Eof);
    }

    if !buf.ends_with('\n') && bytes_read as u64 >= limit {
        return Err(SessionError::MessageTooLarge {
            size: bytes_read,
            max: MAX_LINE_LENGTH,
        });
    }

    if buf.ends_with('\n') {
        buf.pop();
        if buf.ends_with('\r') {
            buf.pop();
        }
    }

    if buf.len() > MAX_LINE_LENGTH {
        return Err(SessionError::MessageTooLarge {
            size: buf.len(),
            max: MAX_LINE_LENGTH,
        });
    }

    Ok(buf)
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Line too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Outbound connection closed")]
    OutboundClosed,

    #[error("Server shutting down")]
    Shutdown,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

    struct Client {
        reader: BufReader<ReadHalf<DuplexStream>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            let mut line = String::new();
            let read = timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for line")
                .unwrap();
            if read == 0 {
                return None;
            }
            Some(line.trim_end_matches('\n').to_string())
        }
    }

    fn connect(
        registry: &RegistryHandle,
        id: u64,
        cancel_token: &CancellationToken,
    ) -> (Client, JoinHandle<Option<DisplayName>>) {
        let (client, server) = duplex(16 * 1024);
        let (server_read, server_write) = split(server);
        let task = tokio::spawn(serve_connection(
            server_read,
            server_write,
            registry.clone(),
            ConnectionId::new(id),
            3456,
            cancel_token.clone(),
        ));

        let (client_read, client_write) = split(client);
        (
            Client {
                reader: BufReader::new(client_read),
                writer: client_write,
            },
            task,
        )
    }

    async fn join(client: &mut Client, name: &str) {
        client.recv().await.unwrap();
        client.send(&format!(":meet {name}")).await;
        assert_eq!(
            client.recv().await.unwrap(),
            format!("Hello, {name}! You are now connected.")
        );
    }

    #[tokio::test]
    async fn test_welcome_and_handshake() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut client, _task) = connect(&registry, 1, &cancel);

        assert_eq!(
            client.recv().await.unwrap(),
            "Welcome to the chat server. Please identify yourself with the command ':meet YourName'."
        );

        client.send("hello?").await;
        assert_eq!(
            client.recv().await.unwrap(),
            "Error: Please identify yourself with the command ':meet YourName'."
        );

        client.send(":who").await;
        assert_eq!(
            client.recv().await.unwrap(),
            "Error: Please identify yourself with the command ':meet YourName'."
        );

        client.send(":meet   ").await;
        assert_eq!(
            client.recv().await.unwrap(),
            "Error: Please identify yourself with the command ':meet YourName'."
        );

        client.send(":meet alice").await;
        assert_eq!(
            client.recv().await.unwrap(),
            "Hello, alice! You are now connected."
        );
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_name_keeps_handshake_open() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut client, _task) = connect(&registry, 1, &cancel);
        client.recv().await.unwrap();

        client.send(":meet two words").await;
        let reply = client.recv().await.unwrap();
        assert!(reply.starts_with("Error: Invalid name 'two words'"), "{reply}");

        client.send(":meet alice").await;
        assert_eq!(
            client.recv().await.unwrap(),
            "Hello, alice! You are now connected."
        );
    }

    #[tokio::test]
    async fn test_name_in_use_then_retry() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut alice, _a) = connect(&registry, 1, &cancel);
        join(&mut alice, "alice").await;

        let (mut other, _b) = connect(&registry, 2, &cancel);
        other.recv().await.unwrap();
        other.send(":meet alice").await;
        assert_eq!(
            other.recv().await.unwrap(),
            "Error: This name is already in use. Please choose a different name."
        );

        other.send(":meet bob").await;
        assert_eq!(
            other.recv().await.unwrap(),
            "Hello, bob! You are now connected."
        );
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_chat_full_rejects_connection() {
        let registry = spawn_registry(1);
        let cancel = CancellationToken::new();
        let (mut alice, _a) = connect(&registry, 1, &cancel);
        join(&mut alice, "alice").await;

        let (mut late, task) = connect(&registry, 2, &cancel);
        assert_eq!(late.recv().await.unwrap(), "Chat is full : (");
        assert_eq!(late.recv().await, None);
        assert_eq!(task.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chat_reaches_others_but_not_sender() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut alice, _a) = connect(&registry, 1, &cancel);
        let (mut bob, _b) = connect(&registry, 2, &cancel);
        join(&mut alice, "alice").await;
        join(&mut bob, "bob").await;

        alice.send("hi all").await;
        assert_eq!(bob.recv().await.unwrap(), "[alice]: hi all");

        // The sender only sees its own command reply
        alice.send(":n").await;
        assert_eq!(alice.recv().await.unwrap(), "Members: 2");
    }

    #[tokio::test]
    async fn test_empty_lines_are_ignored() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut alice, _a) = connect(&registry, 1, &cancel);
        let (mut bob, _b) = connect(&registry, 2, &cancel);
        join(&mut alice, "alice").await;
        join(&mut bob, "bob").await;

        alice.send("").await;
        alice.send("   ").await;
        alice.send("after").await;
        assert_eq!(bob.recv().await.unwrap(), "[alice]: after");
    }

    #[tokio::test]
    async fn test_quit_sends_farewell_and_closes() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut alice, task) = connect(&registry, 1, &cancel);
        join(&mut alice, "alice").await;

        alice.send(":quit").await;
        assert_eq!(
            alice.recv().await.unwrap(),
            "You have been disconnected from the server."
        );
        assert_eq!(alice.recv().await, None);

        let name = task.await.unwrap();
        assert_eq!(name.map(|n| n.to_string()), Some("alice".to_string()));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut alice, task) = connect(&registry, 1, &cancel);
        join(&mut alice, "alice").await;

        drop(alice);
        task.await.unwrap();

        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_abandoned_handshake_releases_slot() {
        let registry = spawn_registry(1);
        let cancel = CancellationToken::new();
        let (mut first, task) = connect(&registry, 1, &cancel);
        first.recv().await.unwrap();

        drop(first);
        assert_eq!(task.await.unwrap(), None);

        let (mut second, _b) = connect(&registry, 2, &cancel);
        join(&mut second, "bob").await;
    }

    #[tokio::test]
    async fn test_oversized_line_ends_session() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut alice, task) = connect(&registry, 1, &cancel);
        join(&mut alice, "alice").await;

        let huge = "x".repeat(MAX_LINE_LENGTH + 100);
        alice.send(&huge).await;

        task.await.unwrap();
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_sessions() {
        let registry = spawn_registry(4);
        let cancel = CancellationToken::new();
        let (mut alice, task) = connect(&registry, 1, &cancel);
        join(&mut alice, "alice").await;

        cancel.cancel();
        task.await.unwrap();

        assert_eq!(registry.count().await, 0);
        assert_eq!(alice.recv().await, None);
    }

    /// Writer whose every write fails, as on a peer that reset the connection.
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_writer_leaves_no_member_behind() {
        let registry = spawn_registry(1);
        let cancel = CancellationToken::new();

        for id in 0..100 {
            serve_connection(
                &b":meet alice\n"[..],
                BrokenWriter,
                registry.clone(),
                ConnectionId::new(id),
                3456,
                cancel.clone(),
            )
            .await;

            assert!(
                registry.list_names().await.is_empty(),
                "member left registered after attempt {id}"
            );
        }

        // Reservations were returned too
        assert!(registry.admit().await.is_ok());
    }

    #[tokio::test]
    async fn test_stopped_registry_closes_without_chat_full() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let registry = RegistryHandle::new(sender, 4);
        let cancel = CancellationToken::new();

        let (mut client, task) = connect(&registry, 1, &cancel);

        assert_eq!(client.recv().await, None);
        assert_eq!(task.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_strips_crlf() {
        let (mut client, server) = duplex(1024);
        let mut reader = BufReader::new(server);

        client.write_all(b"hello\r\nworld\nlast").await.unwrap();
        drop(client);

        assert_eq!(read_line(&mut reader).await.unwrap(), "hello");
        assert_eq!(read_line(&mut reader).await.unwrap(), "world");
        assert_eq!(read_line(&mut reader).await.unwrap(), "last");
        assert!(matches!(
            read_line(&mut reader).await,
            Err(SessionError::Eof)
        ));
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::MessageTooLarge {
            size: 5000,
            max: MAX_LINE_LENGTH,
        };
        assert!(err.to_string().contains("5000"));
        assert!(err.to_string().contains("4096"));
    }
}
