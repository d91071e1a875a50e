//! Networking for magnet sessions
//!
//! - [`envelope`] - Typed application messages and their JSON wire wrapper
//! - [`peer`] - Rendezvous, handshake and the direct link to one peer
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────┐
//!                    │  Game Session       │
//!                    └──────────┬──────────┘
//!                               │
//!                    ┌──────────▼──────────┐
//!                    │  Envelope Registry  │
//!                    │  (typed messages)   │
//!                    └──────────┬──────────┘
//!                               │
//!                    ┌──────────▼──────────┐
//!                    │  Peer Connection    │
//!                    │  (UDP, one remote)  │
//!                    └─────────────────────┘
//! ```

pub mod envelope;
pub mod peer;

pub use envelope::{
    Envelope, EnvelopeError, Greeting, Message, MessageRegistry, MessageType, TypedMessage,
    register_builtin,
};
pub use peer::{
    ConnectionConfig, ConnectionError, ConnectionState, DirectTarget, PeerConnection,
    RendezvousTarget,
};
