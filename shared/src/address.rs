//! Canonical address keys
//!
//! An [`AddressKey`] is the `ip:port` text form of an observed UDP address.
//! The rendezvous server keys its table by it and embeds it in `Arrived`
//! packets so a client learns where its peer lives.

use std::fmt;
use std::net::{AddrParseError, SocketAddr};
use std::str::FromStr;

/// Canonical string identity of a UDP socket address.
///
/// Built from a [`SocketAddr`], so two sockets observed at the same address
/// always produce equal keys. Parsing from text normalizes the input through
/// `SocketAddr` as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressKey(String);

impl AddressKey {
    /// The key as text, e.g. `"203.0.113.7:51234"`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the key back into a socket address.
    pub fn to_socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.0.parse()
    }
}

impl From<SocketAddr> for AddressKey {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl From<&SocketAddr> for AddressKey {
    fn from(addr: &SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl FromStr for AddressKey {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddr = s.parse()?;
        Ok(Self::from(addr))
    }
}

impl fmt::Display for AddressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
