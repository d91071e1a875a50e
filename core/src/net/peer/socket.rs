//! UDP socket layer for peer connections
//!
//! One socket carries both kinds of traffic: handshake text packets
//! (to/from the rendezvous server and the peer during introduction) and JSON
//! envelopes once connected. [`classify`] tells them apart by the first byte.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use magnet_shared::{HandshakeDecodeError, HandshakePacket};

use super::error::ConnectionError;
use crate::net::envelope::{self, Message};

/// Resolve a `host:port` string to a socket address.
///
/// Accepts literal addresses and host names. IPv4 results are preferred
/// since the default bind address is IPv4.
pub fn resolve(addr: &str) -> Result<SocketAddr, ConnectionError> {
    let addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| ConnectionError::Address {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?
        .collect();
    let preferred = addrs.iter().find(|a| a.is_ipv4()).or_else(|| addrs.first());
    preferred.copied().ok_or_else(|| ConnectionError::Address {
        addr: addr.to_string(),
        reason: "resolved to no addresses".to_string(),
    })
}

/// Shared handle to the connection's UDP socket
///
/// Cloning is cheap; the receive loop and the owning connection hold one
/// handle each.
#[derive(Clone)]
pub struct PeerSocket {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl PeerSocket {
    /// Bind to the specified address with a read timeout.
    ///
    /// The timeout lets the receive loop wake up regularly to re-announce
    /// and to notice that the connection was closed.
    pub fn bind(addr: &str, read_timeout: Duration) -> Result<Self, ConnectionError> {
        let socket_addr = resolve(addr)?;

        let socket = UdpSocket::bind(socket_addr).map_err(|source| ConnectionError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        socket
            .set_read_timeout(Some(read_timeout))
            .map_err(ConnectionError::SocketOption)?;

        let local_addr = socket.local_addr().map_err(|source| ConnectionError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        tracing::debug!(%local_addr, "PeerSocket bound");

        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a handshake text packet
    pub fn send_handshake(
        &self,
        target: SocketAddr,
        packet: &HandshakePacket,
    ) -> Result<(), ConnectionError> {
        self.socket
            .send_to(&packet.to_bytes(), target)
            .map_err(ConnectionError::Send)?;
        tracing::trace!(%target, %packet, "Sent handshake packet");
        Ok(())
    }

    /// Wrap a message in an envelope and send it
    pub fn send_message(
        &self,
        target: SocketAddr,
        message: &dyn Message,
    ) -> Result<(), ConnectionError> {
        let bytes = envelope::encode(message)?;
        self.socket
            .send_to(&bytes, target)
            .map_err(ConnectionError::Send)?;
        tracing::trace!(%target, message_type = %message.message_type(), "Sent envelope");
        Ok(())
    }

    /// Blocking receive, bounded by the read timeout
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }
}

impl std::fmt::Debug for PeerSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSocket")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// A received datagram sorted by protocol
#[derive(Debug)]
pub enum Incoming<'a> {
    /// Handshake text packet
    Handshake(HandshakePacket),
    /// JSON envelope, still undecoded
    Envelope(&'a [u8]),
    /// Neither
    Garbage(HandshakeDecodeError),
}

/// Sort raw datagram bytes into handshake or envelope traffic
pub fn classify(bytes: &[u8]) -> Incoming<'_> {
    if bytes.first() == Some(&b'{') {
        return Incoming::Envelope(bytes);
    }
    match HandshakePacket::from_bytes(bytes) {
        Ok(packet) => Incoming::Handshake(packet),
        Err(e) => Incoming::Garbage(e),
    }
}

/// Returns true for read errors that only mean "nothing arrived yet"
pub(super) fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
