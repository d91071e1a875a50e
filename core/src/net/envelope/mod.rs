//! Envelope codec for in-session application messages
//!
//! Once two peers are connected, every packet between them is an envelope:
//! a message type code plus the message's own JSON serialization.
//!
//! # Wire Format
//!
//! ```text
//! {"Type":300,"Data":{ ...message fields... }}
//! ```
//!
//! Decoding goes through a [`MessageRegistry`]. Unknown type codes,
//! malformed JSON and payloads that don't fit the registered type all fail
//! with an [`EnvelopeError`]; the connection logs and drops those packets.

mod builtin;
mod registry;


use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

pub use builtin::{Greeting, register_builtin};
pub use registry::{Message, MessageRegistry, MessageType, TypedMessage};

/// Wire wrapper pairing a type code with a serialized message
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Type")]
    pub message_type: MessageType,
    #[serde(rename = "Data")]
    pub data: Box<RawValue>,
}

impl Envelope {
    /// Wrap a message, serializing its payload
    pub fn wrap(message: &dyn Message) -> Result<Self, EnvelopeError> {
        let message_type = message.message_type();
        let data = message
            .to_payload()
            .map_err(|source| EnvelopeError::Encode {
                message_type,
                source,
            })?;
        Ok(Self { message_type, data })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|source| EnvelopeError::Encode {
            message_type: self.message_type,
            source,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(bytes).map_err(EnvelopeError::Malformed)
    }
}

/// Serialize a message straight to envelope bytes
pub fn encode(message: &dyn Message) -> Result<Vec<u8>, EnvelopeError> {
    Envelope::wrap(message)?.to_bytes()
}

/// Errors from encoding or decoding envelopes
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Bytes are not a JSON envelope
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    /// No decoder registered for the type code; the message is dropped
    #[error("message type {0} is not registered, dropped")]
    Unregistered(MessageType),
    /// Payload does not deserialize into the registered type
    #[error("payload of message type {message_type} failed to decode: {source}")]
    Payload {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
    },
    /// Message could not be serialized
    #[error("failed to encode message type {message_type}: {source}")]
    Encode {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
    },
}

impl EnvelopeError {
    /// True when the envelope was well formed but its type is unknown
    pub fn is_unregistered(&self) -> bool {
        matches!(self, Self::Unregistered(_))
    }
}
