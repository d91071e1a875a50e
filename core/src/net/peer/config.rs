//! Peer connection configuration

use std::time::Duration;

/// Capacity of the inbound message channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// How often an unanswered Hello is repeated while handshaking
pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_millis(250);

/// How often Register/Await are repeated while waiting for a match.
///
/// Must stay below the handshaker's 30 second idle sweep.
pub const DEFAULT_REREGISTER_INTERVAL: Duration = Duration::from_secs(10);

/// Socket read timeout; bounds how quickly the loop notices `close()`
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Settings shared by every way of starting a connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Local display name, sent in Register and Hello
    pub name: String,
    /// Address to bind the local socket to; ephemeral when `None`
    pub local_addr: Option<String>,
    /// Inbound channel capacity; newest messages are dropped when full
    pub channel_capacity: usize,
    pub hello_interval: Duration,
    pub reregister_interval: Duration,
    pub read_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_addr: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            hello_interval: DEFAULT_HELLO_INTERVAL,
            reregister_interval: DEFAULT_REREGISTER_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_local_addr(mut self, addr: impl Into<String>) -> Self {
        self.local_addr = Some(addr.into());
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub(super) fn bind_addr(&self) -> &str {
        self.local_addr.as_deref().unwrap_or("0.0.0.0:0")
    }
}

/// Meet a peer through a rendezvous server
#[derive(Debug, Clone)]
pub struct RendezvousTarget {
    /// Handshaker address, e.g. `"handshaker.example.net:20219"`
    pub server: String,
    /// Peer to search for. `None` only registers and waits to be found.
    pub target: Option<String>,
}

impl RendezvousTarget {
    /// Register and wait for someone to search for us
    pub fn wait(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            target: None,
        }
    }

    /// Register and search for `target`
    pub fn search(server: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            target: Some(target.into()),
        }
    }
}

/// Connect directly without a rendezvous server
///
/// With a remote address the connection introduces itself to that address;
/// without one it waits on [`ConnectionConfig::local_addr`] for a peer to
/// introduce itself.
#[derive(Debug, Clone, Default)]
pub struct DirectTarget {
    pub remote: Option<String>,
}

impl DirectTarget {
    /// Wait for a joining peer on the configured local address
    pub fn host() -> Self {
        Self { remote: None }
    }

    /// Introduce ourselves to a hosting peer
    pub fn join(remote: impl Into<String>) -> Self {
        Self {
            remote: Some(remote.into()),
        }
    }
}
