//! Message kinds owned by the connection layer itself

use serde::{Deserialize, Serialize};

use super::{MessageRegistry, MessageType, TypedMessage};

/// Opening application message sent by each side on entering Connected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub text: String,
}

impl Greeting {
    pub fn from_name(name: &str) -> Self {
        Self {
            text: format!("hai from {}", name),
        }
    }
}

impl TypedMessage for Greeting {
    const MESSAGE_TYPE: MessageType = MessageType(1);
}

/// Register the connection layer's own message kinds
pub fn register_builtin(registry: &mut MessageRegistry) {
    registry.register::<Greeting>();
}
