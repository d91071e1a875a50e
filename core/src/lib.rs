//! Magnet Core - peer networking for small multiplayer games
//!
//! Two players meet through a handshaker (or dial each other directly),
//! then exchange typed messages over a single UDP socket.
//!
//! # Architecture
//!
//! - [`PeerConnection`] - One session's link to a single remote peer
//! - [`MessageRegistry`] - Decodes envelopes into registered message types
//! - [`TypedMessage`] - Implemented by every message a game sends

pub mod net;

pub use net::{
    ConnectionConfig, ConnectionError, ConnectionState, DirectTarget, Envelope, EnvelopeError,
    Greeting, Message, MessageRegistry, MessageType, PeerConnection, RendezvousTarget,
    TypedMessage, register_builtin,
};
