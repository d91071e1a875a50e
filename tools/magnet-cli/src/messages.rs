//! Message kinds exchanged by the CLI

use magnet_core::{MessageRegistry, MessageType, TypedMessage};
use serde::{Deserialize, Serialize};

/// A line of chat typed by a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub from: String,
    pub text: String,
}

impl TypedMessage for Chat {
    const MESSAGE_TYPE: MessageType = MessageType(100);
}

/// Periodic keepalive so an idle chat does not look like a lost peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub seq: u64,
}

impl TypedMessage for Heartbeat {
    const MESSAGE_TYPE: MessageType = MessageType(101);
}

/// Add the CLI's message kinds to a registry
pub fn register(registry: &mut MessageRegistry) {
    registry.register::<Chat>().register::<Heartbeat>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use magnet_core::net::envelope::encode;

    #[test]
    fn test_register_and_decode() {
        let mut registry = MessageRegistry::new();
        register(&mut registry);
        assert_eq!(registry.len(), 2);

        let chat = Chat {
            from: "alice".to_string(),
            text: "gl hf".to_string(),
        };
        let bytes = encode(&chat).unwrap();
        let decoded = registry.decode(&bytes).unwrap();
        assert_eq!(decoded.downcast_ref::<Chat>(), Some(&chat));
        assert!(decoded.downcast_ref::<Heartbeat>().is_none());
    }
}
