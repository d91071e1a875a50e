//! Peer connection: rendezvous, handshake, and direct message exchange
//!
//! Takes one client from registration with a handshaker to a direct UDP
//! link with exactly one remote peer.
//!
//! # Protocol Flow
//!
//! ```text
//! Alice                     Handshaker                      Bob
//!   |--- Register alice ------->|                             |
//!   |<-- Ack -------------------|                             |
//!   |                           |<------ Register bob --------|
//!   |                           |<------ Await alice ---------|
//!   |<-- Arrived <bob addr> ----|---- Arrived <alice addr> -->|
//!   |                                                         |
//!   |<================ Hello / Hello (direct) ===============>|
//!   |<================ Greeting envelopes ===================>|
//!   |<================ application envelopes ================>|
//! ```
//!
//! Direct mode skips the handshaker: the joiner says Hello to the host's
//! address and the host adopts whoever says Hello first.
//!
//! There is no disconnect packet. The owning session watches
//! [`PeerConnection::idle_for`] and decides when the peer is gone.

mod config;
mod connection;
mod driver;
mod error;
mod socket;
mod state;


pub use config::{
    ConnectionConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HELLO_INTERVAL, DEFAULT_READ_TIMEOUT,
    DEFAULT_REREGISTER_INTERVAL, DirectTarget, RendezvousTarget,
};
pub use connection::PeerConnection;
pub use error::ConnectionError;
pub use socket::{Incoming, PeerSocket, classify, resolve};
pub use state::ConnectionState;
