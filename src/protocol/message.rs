//! Inbound message shapes.
//!
//! # Shapes
//! - Auth: `{"username": "<string>"}`
//! - Resource request: `{"username": "<string>", "time": <int>, "request": <int>}`
//!
//! `time` and `request` may also arrive as decimal strings
//! (`"request": "6243"`); older clients send them that way.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::arbiter::resources::RESOURCE_COUNT;

/// Why an inbound document could not be classified.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("missing or non-string 'username'")]
    MissingUsername,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' is not an integer")]
    NotAnInteger(&'static str),

    #[error("request mask {0} does not fit in 32 bits")]
    MaskOutOfRange(i64),
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Auth { username: String },
    ResourceRequest(ResourceRequest),
}

/// A request for one or more resource slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub username: String,
    /// Requested hold time hint in ms. Informational only.
    pub time_ms: i64,
    pub mask: RequestMask,
}

/// Bitmask selecting resource slots: bit `i` selects slot `i`.
///
/// Bits above the slot count are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMask(u32);

impl RequestMask {
    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// 0-based slot indices selected by this mask, ascending.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..RESOURCE_COUNT).filter(move |i| self.0 & (1u32 << *i) != 0)
    }
}

impl Inbound {
    /// Classify a decoded JSON document.
    ///
    /// A document carrying `request` is a resource request; anything else
    /// with a `username` is an authorization attempt.
    pub fn from_value(value: &Value) -> Result<Self, MessageError> {
        let object = value.as_object().ok_or(MessageError::NotAnObject)?;
        let username = object
            .get("username")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingUsername)?
            .to_string();

        if !object.contains_key("request") {
            return Ok(Inbound::Auth { username });
        }

        let time_ms = integer_field(object, "time")?;
        let raw_mask = integer_field(object, "request")?;
        let mask = u32::try_from(raw_mask).map_err(|_| MessageError::MaskOutOfRange(raw_mask))?;

        Ok(Inbound::ResourceRequest(ResourceRequest {
            username,
            time_ms,
            mask: RequestMask::new(mask),
        }))
    }
}

fn integer_field(object: &Map<String, Value>, key: &'static str) -> Result<i64, MessageError> {
    match object.get(key) {
        None | Some(Value::Null) => Err(MessageError::MissingField(key)),
        Some(Value::Number(n)) => n.as_i64().ok_or(MessageError::NotAnInteger(key)),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| MessageError::NotAnInteger(key)),
        Some(_) => Err(MessageError::NotAnInteger(key)),
    }
}
