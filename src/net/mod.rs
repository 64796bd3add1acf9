//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, admission)
//!     → connection.rs (frame decoding, outbox draining)
//!     → arbiter (router, handlers)
//!
//! server.rs owns the listener lifecycle and the operator surface.
//! ```
//!
//! # Design Decisions
//! - Rejected peers are dropped before any session exists
//! - Each connection is one task; replies arrive through its outbox
//! - The disconnect is reported once, when the task exits

pub mod connection;
pub mod listener;
pub mod server;

pub use connection::ConnectionId;
pub use server::{ResourceServer, ServerError};
