//! Centralized constants for the Magnet netplay stack.
//!
//! Values here are shared by the rendezvous server and the client
//! connection so both sides agree on limits and defaults.

use std::time::Duration;

/// Default UDP port the rendezvous server (handshaker) listens on.
pub const DEFAULT_HANDSHAKER_PORT: u16 = 20219;

/// Default UDP port used when hosting a direct (non-rendezvous) game.
pub const DEFAULT_DIRECT_PORT: u16 = 20220;

/// Maximum display name length in bytes.
///
/// Names travel inside single space-separated text packets, so they are
/// kept short and may not contain whitespace.
pub const MAX_NAME_LEN: usize = 32;

/// A registration older than this is swept from the rendezvous table.
pub const REGISTRATION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Receive buffer size for rendezvous packets.
pub const HANDSHAKE_BUFFER_SIZE: usize = 1024;

/// Receive buffer size for direct peer traffic (envelopes are larger).
pub const PEER_BUFFER_SIZE: usize = 10_000;
