//! UDP serve loop around the registration table

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use magnet_shared::constants::{
    DEFAULT_HANDSHAKER_PORT, HANDSHAKE_BUFFER_SIZE, REGISTRATION_IDLE_TIMEOUT,
};
use thiserror::Error;

use crate::table::RegistrationTable;

/// Handshaker settings
#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    /// Address to listen on
    pub bind: String,
    /// Registrations older than this are swept
    pub idle_timeout: Duration,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", DEFAULT_HANDSHAKER_PORT),
            idle_timeout: REGISTRATION_IDLE_TIMEOUT,
        }
    }
}

impl RendezvousConfig {
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            ..Default::default()
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

/// Fatal handshaker errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("socket read failed: {0}")]
    Read(#[source] io::Error),
    #[error("failed to send to {to}: {source}")]
    Write {
        to: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to configure socket: {0}")]
    SocketOption(#[source] io::Error),
}

/// Rendezvous server.
///
/// Strictly sequential: one packet is read, matched and answered before the
/// next is read, so pairing needs no locking.
pub struct RendezvousServer {
    socket: UdpSocket,
    local_addr: SocketAddr,
    table: RegistrationTable,
    buf: Vec<u8>,
}

impl RendezvousServer {
    pub fn bind(config: &RendezvousConfig) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(&config.bind).map_err(|source| ServerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
        let local_addr = socket.local_addr().map_err(ServerError::SocketOption)?;

        tracing::info!(%local_addr, idle_timeout = ?config.idle_timeout, "Handshaker listening");

        Ok(Self {
            socket,
            local_addr,
            table: RegistrationTable::new(config.idle_timeout),
            buf: vec![0u8; HANDSHAKE_BUFFER_SIZE],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn table(&self) -> &RegistrationTable {
        &self.table
    }

    /// Bound each read so callers can interleave other work
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ServerError> {
        self.socket
            .set_read_timeout(timeout)
            .map_err(ServerError::SocketOption)
    }

    /// Read and fully process one packet.
    ///
    /// Returns `Ok(false)` when the read timed out or was reset by an ICMP
    /// error from an earlier send.
    pub fn serve_one(&mut self) -> Result<bool, ServerError> {
        let (len, from) = match self.socket.recv_from(&mut self.buf) {
            Ok(received) => received,
            Err(e) => {
                return match e.kind() {
                    io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted => Ok(false),
                    io::ErrorKind::ConnectionReset => {
                        tracing::debug!(error = %e, "Ignoring connection reset");
                        Ok(false)
                    }
                    _ => Err(ServerError::Read(e)),
                };
            }
        };

        tracing::trace!(%from, len, "Packet received");

        let replies = self.table.handle(from, &self.buf[..len], Instant::now());
        for reply in replies {
            self.socket
                .send_to(&reply.packet.to_bytes(), reply.to)
                .map_err(|source| ServerError::Write {
                    to: reply.to,
                    source,
                })?;
        }
        Ok(true)
    }

    /// Serve until a socket error
    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            self.serve_one()?;
        }
    }
}

impl std::fmt::Debug for RendezvousServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendezvousServer")
            .field("local_addr", &self.local_addr)
            .field("registered", &self.table.len())
            .finish()
    }
}
