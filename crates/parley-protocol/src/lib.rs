//! Parley Protocol - Line protocol for the chat server
//!
//! This crate provides parsing of client input lines into commands and
//! chat messages, and the text of every line the server sends back.

pub mod message;
pub mod parse;

pub use message::ServerLine;
pub use parse::{
    ClientLine, Command, ParseError, Request, COMMAND_PREFIX, MEET_USAGE, WHISPER_USAGE,
};
