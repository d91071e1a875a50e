//! Connection state shared between the owner and the receive loop
//!
//! Everything here is written by the receive loop and read by the owning
//! session (or the reverse for `closed`/`disconnected`), so it is all atomics
//! plus a set-once cell for the remote address.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Peer connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Nothing started
    Idle = 0,
    /// Register sent to the handshaker
    Registering = 1,
    /// Waiting for a match (handshaker Await, or a direct host listening)
    Awaiting = 2,
    /// Peer address known, Hello sent, waiting for proof of life
    Handshaking = 3,
    /// Remote address locked in, exchanging envelopes
    Connected = 4,
    /// Socket released
    Closed = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Registering,
            2 => Self::Awaiting,
            3 => Self::Handshaking,
            4 => Self::Connected,
            5 => Self::Closed,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug)]
pub(super) struct SharedState {
    state: AtomicU8,
    remote: OnceLock<SocketAddr>,
    closed: AtomicBool,
    disconnected: AtomicBool,
    rendezvous_alive: AtomicBool,
    epoch: Instant,
    /// Milliseconds since `epoch` of the last accepted peer packet, plus one.
    /// Zero means nothing has been received.
    last_activity: AtomicU64,
}

impl SharedState {
    pub(super) fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Idle as u8),
            remote: OnceLock::new(),
            closed: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            rendezvous_alive: AtomicBool::new(false),
            epoch: Instant::now(),
            last_activity: AtomicU64::new(0),
        }
    }

    pub(super) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(super) fn set_state(&self, state: ConnectionState) {
        let previous = ConnectionState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "Peer connection state changed");
        }
    }

    /// Lock in the remote address. Later calls keep the first address.
    pub(super) fn lock_remote(&self, addr: SocketAddr) -> SocketAddr {
        *self.remote.get_or_init(|| addr)
    }

    pub(super) fn remote(&self) -> Option<SocketAddr> {
        self.remote.get().copied()
    }

    pub(super) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(super) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(super) fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.store(disconnected, Ordering::Release);
    }

    pub(super) fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    pub(super) fn mark_rendezvous_alive(&self) {
        self.rendezvous_alive.store(true, Ordering::Release);
    }

    pub(super) fn rendezvous_alive(&self) -> bool {
        self.rendezvous_alive.load(Ordering::Acquire)
    }

    /// Record that a packet was accepted from the peer just now
    pub(super) fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_activity.store(elapsed + 1, Ordering::Release);
    }

    /// Time since the last accepted peer packet
    pub(super) fn idle_for(&self) -> Option<Duration> {
        match self.last_activity.load(Ordering::Acquire) {
            0 => None,
            stamp => {
                let last = Duration::from_millis(stamp - 1);
                Some(self.epoch.elapsed().saturating_sub(last))
            }
        }
    }
}
