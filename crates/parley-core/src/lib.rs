//! Parley Core - Shared domain types for the chat server
//!
//! This crate provides the identity types shared between the line
//! protocol (`parley-protocol`) and the daemon (`parleyd`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod name;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use name::{ConnectionId, DisplayName, MAX_NAME_LEN};
