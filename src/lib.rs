//! # assuan
//!
//! An implementation of the Assuan protocol: the line-oriented IPC
//! protocol GnuPG components use to talk to privileged agent processes
//! (gpg-agent, pinentry, scdaemon) over a local socket or pipe pair.
//!
//! The crate is the protocol engine only. Transports hand it the two
//! halves of a duplex byte stream; everything above that — framing,
//! percent escaping, the command/response state machines, INQUIRE
//! sub-dialogs and cancellation — lives here.
//!
//! ## Architecture Overview
//!
//! ```text
//!   raw bytes
//!      │
//! ┌────▼─────────┐   ┌───────────────┐   ┌────────────────────┐
//! │  Line Codec  │──▶│ Message Model │──▶│   State Machine    │
//! │ (framing +   │   │ (typed lines) │   │ (server or client) │
//! │  %-escaping) │   │               │   │                    │
//! └──────────────┘   └───────────────┘   └─────────┬──────────┘
//!                                                  │
//!                                        handlers / caller
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use assuan::{Config, Server};
//!
//! let mut server = Server::new(Config::default());
//! server.register("ECHO", |session, params| {
//!     session.send_data(params.unwrap_or("").as_bytes())?;
//!     Ok(None)
//! });
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod client;
pub mod server;
pub mod transport;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{code, AssuanError, Result};
pub use config::Config;
pub use client::{Client, Reply};
pub use protocol::Message;
pub use server::{Server, ServerSession, SessionState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
