//! Client wire protocol.
//!
//! # Data Flow
//! ```text
//! bytes from socket
//!     → framing.rs (buffer, split into JSON documents)
//!     → message.rs (classify: Auth | ResourceRequest)
//!     → arbiter router
//!
//! arbiter decision
//!     → response.rs ({username, resource, status})
//!     → bytes to socket
//! ```
//!
//! # Design Decisions
//! - Undecodable input is dropped silently; clients never see parse errors
//! - Outbound documents are newline-terminated for line-oriented clients

pub mod framing;
pub mod message;
pub mod response;

pub use framing::{FrameDecoder, FrameError};
pub use message::{Inbound, MessageError, RequestMask, ResourceRequest};
pub use response::{Response, Status};
