//! TCP resource arbitration server library.

pub mod admin;
pub mod arbiter;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;

pub use config::schema::ArbiterConfig;
pub use lifecycle::Shutdown;
pub use net::ResourceServer;
