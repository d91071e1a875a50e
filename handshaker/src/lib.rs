//! Magnet handshaker - UDP rendezvous server
//!
//! Lets two named clients learn each other's public address, then forgets
//! them. See [`table`] for the matching rules and [`server`] for the socket
//! loop.

pub mod server;
pub mod table;

pub use server::{RendezvousConfig, RendezvousServer, ServerError};
pub use table::{MessageBox, Outbound, RegistrationTable, Replies};
