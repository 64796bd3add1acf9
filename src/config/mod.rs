//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, boundary normalization)
//!     → ArbiterConfig handed to ResourceServer::new
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → runtime-adjustable fields applied through the operator setters
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Out-of-range numbers are normalized, not rejected
//! - Port changes only take effect on the next start

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::AdminConfig;
pub use schema::ArbiterConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::{ABSOLUTE_CLIENT_LIMIT, DEFAULT_Z_TIME_MS};
