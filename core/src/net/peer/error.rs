//! Error types for peer connections

use std::io;

use thiserror::Error;

use crate::net::envelope::EnvelopeError;

/// Errors surfaced by [`PeerConnection`](super::PeerConnection)
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Display name can't travel in a handshake packet
    #[error("invalid name '{0}': must be 1-32 bytes without whitespace")]
    InvalidName(String),
    /// Address did not parse or resolve
    #[error("invalid address '{addr}': {reason}")]
    Address { addr: String, reason: String },
    /// Failed to bind the local socket
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// Failed to configure the socket
    #[error("socket option error: {0}")]
    SocketOption(#[source] io::Error),
    /// Failed to send a packet
    #[error("send failed: {0}")]
    Send(#[source] io::Error),
    /// Failed to start the receive loop
    #[error("failed to spawn receive loop: {0}")]
    Spawn(#[source] io::Error),
    /// Configuration can't produce a connection
    #[error("invalid connection config: {0}")]
    InvalidConfig(&'static str),
    /// Application send before a peer was locked in
    #[error("not connected to a peer")]
    NotConnected,
    /// Operation on a closed connection
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}
