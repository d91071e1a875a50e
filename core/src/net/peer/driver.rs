//! Receive loop and handshake state machine
//!
//! Runs on the connection's own thread. Owns every state transition after
//! setup: handshaker replies, Hello exchange, locking in the remote address,
//! and decoding envelopes into the inbound channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use magnet_shared::HandshakePacket;
use magnet_shared::constants::PEER_BUFFER_SIZE;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::socket::{Incoming, PeerSocket, classify, is_timeout};
use super::state::{ConnectionState, SharedState};
use crate::net::envelope::{Greeting, Message, MessageRegistry};

/// How the session was started
#[derive(Debug, Clone)]
pub(super) enum Mode {
    /// Through a handshaker at `server`, optionally searching for `target`
    Rendezvous {
        server: SocketAddr,
        target: Option<String>,
    },
    /// Straight to a known address, or waiting for one to say Hello
    Direct,
}

pub(super) struct Driver {
    pub(super) name: String,
    pub(super) mode: Mode,
    pub(super) socket: PeerSocket,
    pub(super) shared: Arc<SharedState>,
    pub(super) registry: Arc<MessageRegistry>,
    pub(super) inbound: mpsc::Sender<Box<dyn Message>>,
    /// Address from Arrived (or the direct remote) not yet proven live
    pub(super) pending_peer: Option<SocketAddr>,
    pub(super) hello_interval: Duration,
    pub(super) reregister_interval: Duration,
    pub(super) last_hello: Instant,
    pub(super) last_register: Instant,
}

impl Driver {
    /// Loop until the connection is closed or the socket fails
    pub(super) fn run(mut self) {
        let mut buf = vec![0u8; PEER_BUFFER_SIZE];

        while !self.shared.is_closed() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => self.handle_packet(from, &buf[..len]),
                Err(e) if is_timeout(&e) => {}
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                    // ICMP unreachable from an earlier send (Windows reports it on recv)
                    tracing::debug!(error = %e, "Ignoring connection reset on UDP socket");
                }
                Err(e) => {
                    if !self.shared.is_closed() {
                        tracing::error!(error = %e, "Peer socket read failed, closing");
                    }
                    break;
                }
            }
            self.tick(Instant::now());
        }

        self.shared.set_state(ConnectionState::Closed);
        tracing::debug!(name = %self.name, "Peer receive loop exited");
    }

    /// Periodic re-announcements
    pub(super) fn tick(&mut self, now: Instant) {
        match self.shared.state() {
            ConnectionState::Handshaking => {
                if now.duration_since(self.last_hello) >= self.hello_interval
                    && let Some(peer) = self.pending_peer
                {
                    self.send_hello(peer);
                    self.last_hello = now;
                }
            }
            ConnectionState::Registering | ConnectionState::Awaiting => {
                if now.duration_since(self.last_register) >= self.reregister_interval {
                    self.announce();
                    self.last_register = now;
                }
            }
            _ => {}
        }
    }

    /// Send Register, then Await when searching for a target.
    ///
    /// No-op in direct mode.
    pub(super) fn announce(&self) {
        let Mode::Rendezvous { server, target } = &self.mode else {
            return;
        };

        let register = HandshakePacket::Register {
            name: self.name.clone(),
        };
        if let Err(e) = self.socket.send_handshake(*server, &register) {
            tracing::warn!(error = %e, %server, "Failed to send Register");
        }

        if let Some(target) = target {
            let await_packet = HandshakePacket::Await {
                target: target.clone(),
            };
            if let Err(e) = self.socket.send_handshake(*server, &await_packet) {
                tracing::warn!(error = %e, %server, "Failed to send Await");
            }
        }
    }

    pub(super) fn handle_packet(&mut self, from: SocketAddr, bytes: &[u8]) {
        let state = self.shared.state();

        if state == ConnectionState::Connected {
            self.handle_connected(from, bytes);
            return;
        }

        match classify(bytes) {
            Incoming::Envelope(data) => {
                if state == ConnectionState::Handshaking && self.pending_peer == Some(from) {
                    // Peer already connected on its side; its greeting proves the path
                    self.connect(from);
                    self.shared.touch();
                    self.deliver(data);
                } else {
                    tracing::trace!(%from, ?state, "Dropping envelope before connection");
                }
            }
            Incoming::Handshake(packet) => self.handle_handshake(state, from, packet),
            Incoming::Garbage(e) => {
                tracing::debug!(%from, error = %e, "Dropping unparsable packet");
            }
        }
    }

    fn handle_handshake(&mut self, state: ConnectionState, from: SocketAddr, packet: HandshakePacket) {
        match packet {
            HandshakePacket::Ack => {
                if self.is_server(from) {
                    self.shared.mark_rendezvous_alive();
                }
            }
            HandshakePacket::Arrived { peer } => {
                if !self.is_server(from) {
                    tracing::debug!(%from, "Ignoring Arrived from non-handshaker");
                    return;
                }
                let Ok(peer_addr) = peer.to_socket_addr() else {
                    tracing::warn!(%peer, "Arrived with unusable address");
                    return;
                };
                self.shared.mark_rendezvous_alive();
                match state {
                    ConnectionState::Registering | ConnectionState::Awaiting => {
                        tracing::info!(peer = %peer_addr, "Peer arrived, saying hello");
                        self.begin_handshake(peer_addr);
                    }
                    ConnectionState::Handshaking => {
                        self.connect(peer_addr);
                    }
                    _ => {}
                }
            }
            HandshakePacket::Hello { name } => {
                tracing::info!(%from, peer_name = %name, "Got hello from peer");
                self.connect(from);
                self.shared.touch();
            }
            other => {
                tracing::debug!(%from, code = ?other.code(), "Unexpected handshake packet");
            }
        }
    }

    fn handle_connected(&mut self, from: SocketAddr, bytes: &[u8]) {
        if self.shared.remote() != Some(from) {
            tracing::trace!(%from, "Discarding packet from unexpected sender");
            return;
        }
        self.shared.touch();

        match classify(bytes) {
            Incoming::Envelope(data) => self.deliver(data),
            Incoming::Handshake(HandshakePacket::Hello { .. }) => {
                // Peer still handshaking, our greeting was lost
                self.send_greeting(from);
            }
            Incoming::Handshake(packet) => {
                tracing::debug!(code = ?packet.code(), "Ignoring handshake packet from peer");
            }
            Incoming::Garbage(e) => {
                tracing::debug!(error = %e, "Dropping unparsable packet from peer");
            }
        }
    }

    fn is_server(&self, from: SocketAddr) -> bool {
        matches!(self.mode, Mode::Rendezvous { server, .. } if server == from)
    }

    /// Say Hello to a candidate peer and wait for proof of life
    pub(super) fn begin_handshake(&mut self, peer: SocketAddr) {
        self.pending_peer = Some(peer);
        self.send_hello(peer);
        self.last_hello = Instant::now();
        self.shared.set_state(ConnectionState::Handshaking);
    }

    fn send_hello(&self, peer: SocketAddr) {
        let hello = HandshakePacket::Hello {
            name: self.name.clone(),
        };
        if let Err(e) = self.socket.send_handshake(peer, &hello) {
            tracing::warn!(error = %e, %peer, "Failed to send Hello");
        }
    }

    /// Lock in the remote address and open the channel with a greeting
    fn connect(&mut self, addr: SocketAddr) {
        let remote = self.shared.lock_remote(addr);
        self.pending_peer = None;
        self.shared.set_state(ConnectionState::Connected);
        tracing::info!(%remote, name = %self.name, "Connected to peer");
        self.send_greeting(remote);
    }

    fn send_greeting(&self, remote: SocketAddr) {
        if let Err(e) = self
            .socket
            .send_message(remote, &Greeting::from_name(&self.name))
        {
            tracing::warn!(error = %e, %remote, "Failed to send greeting");
        }
    }

    /// Decode an envelope and hand it to the session without blocking
    fn deliver(&self, data: &[u8]) {
        let message = match self.registry.decode(data) {
            Ok(message) => message,
            Err(e) if e.is_unregistered() => {
                tracing::debug!(error = %e, "Dropping message");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode envelope");
                return;
            }
        };

        match self.inbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                tracing::warn!(
                    message_type = %message.message_type(),
                    "Inbound queue full, dropping newest message"
                );
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Inbound receiver gone, dropping message");
            }
        }
    }
}
