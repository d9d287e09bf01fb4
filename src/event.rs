//! Event envelope and its JSON codec
//!
//! Every inbound frame carries one envelope:
//!
//! ```json
//! {"name": "move", "payload": {"dx": 1}}
//! ```
//!
//! `"data"` is accepted in place of `"payload"` when decoding. The payload is
//! opaque at this layer; handlers interpret it according to `name`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// Decoded unit of an inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, used as the handler table key
    pub name: String,
    /// Opaque event data (`Null` when the frame has none)
    #[serde(default, alias = "data")]
    pub payload: Value,
}

impl Event {
    /// Create an event from a name and an already-built payload
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Deserialize the payload into a typed structure
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Decode raw frame bytes into an event
///
/// Only the name is validated: it must be present, a string, and non-empty.
pub fn decode(raw: &[u8]) -> Result<Event, DecodeError> {
    let event: Event = serde_json::from_slice(raw)?;
    if event.name.is_empty() {
        return Err(DecodeError::MissingName);
    }
    Ok(event)
}

/// Encode an event into its JSON envelope
pub fn encode(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
