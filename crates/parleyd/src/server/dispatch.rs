//! Command dispatch for active members.
//!
//! Maps one parsed command onto exactly one reply line for the sender,
//! plus whatever registry side effects the command has.

use tracing::{debug, warn};

use parley_core::{ConnectionId, DisplayName};
use parley_protocol::{Command, ParseError, Request, ServerLine};

use crate::registry::{RegistryError, RegistryHandle, RemovalReason};

/// Who is issuing the command.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    /// The sender's display name
    pub name: &'a DisplayName,

    /// The sender's connection
    pub connection: ConnectionId,

    /// Port the server is listening on
    pub port: u16,
}

/// Result of dispatching one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Line sent back to the sender
    pub reply: ServerLine,

    /// Whether the session ends after the reply
    pub end_session: bool,
}

impl Outcome {
    fn reply(reply: ServerLine) -> Self {
        Self {
            reply,
            end_session: false,
        }
    }

    fn end(reply: ServerLine) -> Self {
        Self {
            reply,
            end_session: true,
        }
    }
}

/// Dispatches a command from an active member.
///
/// `:meet` is a handshake-only verb and is unknown here.
pub async fn dispatch(
    ctx: &SessionContext<'_>,
    command: &Command,
    registry: &RegistryHandle,
) -> Outcome {
    debug!(name = %ctx.name, verb = %command.verb, "Dispatching command");

    let request = match Request::try_from(command) {
        Ok(request) => request,
        Err(ParseError::Usage { .. }) if command.verb == "meet" => {
            return Outcome::reply(ServerLine::UnknownCommand)
        }
        Err(ParseError::Usage { usage }) => return Outcome::reply(ServerLine::Usage { usage }),
        Err(ParseError::UnknownCommand(_)) => return Outcome::reply(ServerLine::UnknownCommand),
    };

    match request {
        Request::Port => Outcome::reply(ServerLine::Port(ctx.port)),
        Request::Members => Outcome::reply(ServerLine::Members(registry.count().await)),
        Request::Greeting => Outcome::reply(ServerLine::Greeting),
        Request::Who => Outcome::reply(ServerLine::Who(registry.list_names().await)),
        Request::Quit => {
            registry
                .unregister_owned(ctx.name, ctx.connection, RemovalReason::Quit)
                .await;
            Outcome::end(ServerLine::Farewell)
        }
        Request::Whisper { target, message } => {
            whisper(ctx, registry, target, message).await
        }
        Request::Meet { .. } => Outcome::reply(ServerLine::UnknownCommand),
    }
}

async fn whisper(
    ctx: &SessionContext<'_>,
    registry: &RegistryHandle,
    target: String,
    message: String,
) -> Outcome {
    let line = ServerLine::whisper(ctx.name, message).to_string();
    let recipient = DisplayName::new_unchecked(target.clone());

    match registry.unicast(recipient, line).await {
        Ok(()) => {
            debug!(from = %ctx.name, to = %target, "Whisper delivered");
            Outcome::reply(ServerLine::WhisperSent { target })
        }
        Err(RegistryError::MemberNotFound(_)) => {
            Outcome::reply(ServerLine::ClientNotFound { target })
        }
        Err(e) => {
            warn!(from = %ctx.name, to = %target, error = %e, "Whisper failed");
            Outcome::reply(ServerLine::ClientNotFound { target })
        }
    }
}
