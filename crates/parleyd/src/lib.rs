//! parley daemon - member registry and chat session server
//!
//! This crate provides the core infrastructure for the parley chat server:
//! - `registry` - Registry actor mapping display names to connection endpoints
//! - `server` - TCP listener, per-connection sessions and command dispatch
//! - `config` - Listening address and capacity settings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       parleyd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │     │     RegistryActor           │   │
//! │  │  (TcpListener)  │     │  (name → endpoint owner)    │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ RegistryCommand   │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐                    │                   │
//! │  │    Session      │────────────────────┘                   │
//! │  │  (per client)   │                                        │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows a panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod server;
