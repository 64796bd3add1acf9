//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     ResourceServer::stop → trigger → accept loop exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → main → ResourceServer::stop → exit
//! ```
//!
//! # Design Decisions
//! - Only the accept loop and the admin server subscribe to shutdown
//! - Connections are closed through their outbox so queued replies flush first

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
