//! Outbound status messages.
//!
//! Every message the arbiter writes to a client has the same shape:
//! `{"username": "...", "resource": 1..=4, "status": 0|1|2}`.

use serde::{Deserialize, Serialize};

/// Outcome reported for a single resource slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    /// Slot is leased by someone else.
    Denied = 0,
    /// Slot now belongs to the addressee.
    Granted = 1,
    /// Addressee lost the slot.
    Evicted = 2,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Denied => "denied",
            Status::Granted => "granted",
            Status::Evicted => "evicted",
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Denied),
            1 => Ok(Status::Granted),
            2 => Ok(Status::Evicted),
            other => Err(format!("unknown status code {}", other)),
        }
    }
}

/// A status message addressed to one user about one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub username: String,
    /// External, 1-based slot number.
    pub resource: u8,
    pub status: Status,
}

impl Response {
    /// Build a response for the 0-based `slot`.
    pub fn new(username: impl Into<String>, slot: usize, status: Status) -> Self {
        Self {
            username: username.into(),
            resource: slot as u8 + 1,
            status,
        }
    }

    pub fn granted(username: impl Into<String>, slot: usize) -> Self {
        Self::new(username, slot, Status::Granted)
    }

    pub fn denied(username: impl Into<String>, slot: usize) -> Self {
        Self::new(username, slot, Status::Denied)
    }

    pub fn evicted(username: impl Into<String>, slot: usize) -> Self {
        Self::new(username, slot, Status::Evicted)
    }

    /// Serialize as a single newline-terminated JSON document.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
