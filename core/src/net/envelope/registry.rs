//! Typed message registry
//!
//! Maps numeric message type codes to decoder functions so the receive loop
//! can turn an [`Envelope`](super::Envelope) into a concrete message without
//! knowing every message kind in advance.

use std::any::Any;
use std::fmt;

use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::{Envelope, EnvelopeError};

/// Numeric message type code carried in every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(pub u16);

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A concrete message kind with a stable type code.
///
/// Implement this for any serde type to make it sendable over a
/// [`PeerConnection`](crate::net::PeerConnection) and decodable once
/// registered with [`MessageRegistry::register`].
///
/// ```rust,ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// struct SpawnOrb { x: f64, y: f64, worth: u32 }
///
/// impl TypedMessage for SpawnOrb {
///     const MESSAGE_TYPE: MessageType = MessageType(305);
/// }
/// ```
pub trait TypedMessage:
    Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
    const MESSAGE_TYPE: MessageType;
}

/// Object-safe view of a message, used for decoded values and sends.
pub trait Message: Any + fmt::Debug + Send + Sync {
    /// Type code written into the envelope
    fn message_type(&self) -> MessageType;

    /// Serialize the message body for embedding in an envelope
    fn to_payload(&self) -> Result<Box<RawValue>, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;
}

impl<T: TypedMessage> Message for T {
    fn message_type(&self) -> MessageType {
        T::MESSAGE_TYPE
    }

    fn to_payload(&self) -> Result<Box<RawValue>, serde_json::Error> {
        serde_json::value::to_raw_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Message {
    /// Returns true if the message is of type `T`
    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow the message as its concrete type
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

type DecodeFn = fn(&RawValue) -> Result<Box<dyn Message>, serde_json::Error>;

fn decode_as<T: TypedMessage>(raw: &RawValue) -> Result<Box<dyn Message>, serde_json::Error> {
    let message: T = serde_json::from_str(raw.get())?;
    Ok(Box::new(message))
}

#[derive(Clone, Copy)]
struct Decoder {
    type_name: &'static str,
    decode: DecodeFn,
}

/// Registry of decodable message kinds.
///
/// Built once during startup by calling `register` for every message kind
/// (usually through each module's own `register` function), then frozen in
/// an `Arc` and shared read-only with every connection.
#[derive(Default, Clone)]
pub struct MessageRegistry {
    decoders: HashMap<MessageType, Decoder>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register message kind `T` under its type code.
    ///
    /// Registering a second kind under the same code replaces the first.
    pub fn register<T: TypedMessage>(&mut self) -> &mut Self {
        let decoder = Decoder {
            type_name: std::any::type_name::<T>(),
            decode: decode_as::<T>,
        };
        if let Some(previous) = self.decoders.insert(T::MESSAGE_TYPE, decoder) {
            tracing::warn!(
                code = %T::MESSAGE_TYPE,
                replaced = previous.type_name,
                with = decoder.type_name,
                "Message type code registered twice"
            );
        }
        self
    }

    /// Check whether a type code has a decoder
    pub fn contains(&self, message_type: MessageType) -> bool {
        self.decoders.contains_key(&message_type)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode an already parsed envelope into its concrete message.
    ///
    /// Fails with [`EnvelopeError::Unregistered`] when no decoder exists for
    /// the envelope's type code.
    pub fn decode_envelope(&self, envelope: &Envelope) -> Result<Box<dyn Message>, EnvelopeError> {
        let decoder = self
            .decoders
            .get(&envelope.message_type)
            .ok_or(EnvelopeError::Unregistered(envelope.message_type))?;

        (decoder.decode)(&envelope.data).map_err(|source| EnvelopeError::Payload {
            message_type: envelope.message_type,
            source,
        })
    }

    /// Parse envelope bytes and decode the inner message
    pub fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Message>, EnvelopeError> {
        let envelope = Envelope::from_bytes(bytes)?;
        self.decode_envelope(&envelope)
    }
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.decoders.keys().map(|code| code.0).collect();
        codes.sort_unstable();
        f.debug_struct("MessageRegistry")
            .field("codes", &codes)
            .finish()
    }
}
