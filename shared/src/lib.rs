//! Shared types for the Magnet netplay stack.
//!
//! Both the rendezvous server and the client connection speak the
//! handshake line protocol defined here.

pub mod address;
pub mod constants;
pub mod handshake;

pub use address::AddressKey;
pub use handshake::{HandshakeCode, HandshakeDecodeError, HandshakePacket, is_valid_name};
