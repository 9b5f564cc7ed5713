//! Lines the server sends to clients.
//!
//! Each variant renders to exactly one line of text (without terminator)
//! via `Display`.

use std::fmt;

use parley_core::DisplayName;

/// Messages sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Sent once when a connection is admitted
    Welcome,

    /// Connection rejected because every slot is taken
    ChatFull,

    /// Handshake succeeded
    Hello { name: DisplayName },

    /// Handshake name is taken by another member
    NameInUse,

    /// Handshake line was not a usable `:meet`
    IdentifyUsage,

    /// Handshake name failed validation
    InvalidName { name: String, reason: String },

    /// Reply to `:p`
    Port(u16),

    /// Reply to `:n`
    Members(usize),

    /// Reply to `:m`
    Greeting,

    /// Reply to `:who`
    Who(Vec<DisplayName>),

    /// Reply to `:quit`
    Farewell,

    /// Whisper was queued for the target
    WhisperSent { target: String },

    /// Whisper target is not a member
    ClientNotFound { target: String },

    /// Command had the wrong arguments
    Usage { usage: &'static str },

    /// Verb is not in the command table
    UnknownCommand,

    /// Chat line relayed from another member
    Chat { from: DisplayName, text: String },

    /// Private line relayed from another member
    Whisper { from: DisplayName, text: String },
}

impl ServerLine {
    /// Creates a relayed chat line.
    pub fn chat(from: &DisplayName, text: impl Into<String>) -> Self {
        Self::Chat {
            from: from.clone(),
            text: text.into(),
        }
    }

    /// Creates a relayed whisper line.
    pub fn whisper(from: &DisplayName, text: impl Into<String>) -> Self {
        Self::Whisper {
            from: from.clone(),
            text: text.into(),
        }
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Welcome => write!(
                f,
                "Welcome to the chat server. Please identify yourself with the command ':meet YourName'."
            ),
            Self::ChatFull => write!(f, "Chat is full : ("),
            Self::Hello { name } => write!(f, "Hello, {name}! You are now connected."),
            Self::NameInUse => write!(
                f,
                "Error: This name is already in use. Please choose a different name."
            ),
            Self::IdentifyUsage => write!(
                f,
                "Error: Please identify yourself with the command ':meet YourName'."
            ),
            Self::InvalidName { name, reason } => {
                write!(f, "Error: Invalid name '{name}': {reason}.")
            }
            Self::Port(port) => write!(f, "{port}"),
            Self::Members(count) => write!(f, "Members: {count}"),
            Self::Greeting => write!(f, "Welcome to the server"),
            Self::Who(names) => {
                write!(f, "Connected clients: ")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}")?;
                }
                Ok(())
            }
            Self::Farewell => write!(f, "You have been disconnected from the server."),
            Self::WhisperSent { target } => write!(f, "Whisper sent to {target}"),
            Self::ClientNotFound { target } => write!(f, "Error: Client '{target}' not found."),
            Self::Usage { usage } => write!(f, "Error: Usage: {usage}"),
            Self::UnknownCommand => write!(f, "Unknown command"),
            Self::Chat { from, text } => write!(f, "[{from}]: {text}"),
            Self::Whisper { from, text } => write!(f, "[Whisper from {from}]: {text}"),
        }
    }
}
