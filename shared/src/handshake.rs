//! Rendezvous line protocol
//!
//! Every packet is a single line of ASCII text: a decimal handshake code,
//! optionally followed by a space and one argument.
//!
//! # Wire Format
//!
//! ```text
//! 0                  Ack       (server -> client, sent for every packet)
//! 1 <name>           Register  (client -> server)
//! 2 <targetName>     Await     (client -> server)
//! 3 <address>        Arrived   (server -> client)
//! 4 <name>           Hello     (client -> client)
//! ```
//!
//! Only the first token after the code is read; anything after it is
//! ignored.

use std::fmt;

use thiserror::Error;

use crate::address::AddressKey;
use crate::constants::MAX_NAME_LEN;

/// Numeric code leading every handshake packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandshakeCode {
    /// Liveness acknowledgement from the handshaker
    Ack = 0,
    /// Register presence under a name
    Register = 1,
    /// Ask to be paired with a named peer
    Await = 2,
    /// Pairing resolved, carries the peer's address
    Arrived = 3,
    /// Direct introduction between peers
    Hello = 4,
}

impl HandshakeCode {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ack),
            1 => Some(Self::Register),
            2 => Some(Self::Await),
            3 => Some(Self::Arrived),
            4 => Some(Self::Hello),
            _ => None,
        }
    }
}

/// A decoded handshake packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakePacket {
    Ack,
    Register { name: String },
    Await { target: String },
    Arrived { peer: AddressKey },
    Hello { name: String },
}

/// Errors from decoding a handshake packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeDecodeError {
    #[error("packet is empty")]
    Empty,
    #[error("packet is not valid UTF-8")]
    NotUtf8,
    #[error("invalid handshake code '{0}'")]
    InvalidCode(String),
    #[error("unknown handshake code {0}")]
    UnknownCode(u8),
    #[error("{0:?} packet is missing its argument")]
    MissingArgument(HandshakeCode),
    #[error("name is {len} bytes, limit is {}", MAX_NAME_LEN)]
    NameTooLong { len: usize },
    #[error("invalid peer address '{0}'")]
    InvalidAddress(String),
}

/// Check that a display name can travel in a handshake packet.
///
/// Names must be non-empty, at most [`MAX_NAME_LEN`] bytes, and free of
/// whitespace since the protocol is space separated.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && !name.chars().any(char::is_whitespace)
}

fn check_name(name: &str) -> Result<String, HandshakeDecodeError> {
    if name.len() > MAX_NAME_LEN {
        return Err(HandshakeDecodeError::NameTooLong { len: name.len() });
    }
    Ok(name.to_string())
}

impl HandshakePacket {
    pub fn code(&self) -> HandshakeCode {
        match self {
            Self::Ack => HandshakeCode::Ack,
            Self::Register { .. } => HandshakeCode::Register,
            Self::Await { .. } => HandshakeCode::Await,
            Self::Arrived { .. } => HandshakeCode::Arrived,
            Self::Hello { .. } => HandshakeCode::Hello,
        }
    }

    /// Serialize to the text wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parse a packet from raw UDP payload bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HandshakeDecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| HandshakeDecodeError::NotUtf8)?;
        let mut parts = text.split_whitespace();

        let raw_code = parts.next().ok_or(HandshakeDecodeError::Empty)?;
        let value: u8 = raw_code
            .parse()
            .map_err(|_| HandshakeDecodeError::InvalidCode(raw_code.to_string()))?;
        let code = HandshakeCode::from_u8(value).ok_or(HandshakeDecodeError::UnknownCode(value))?;

        if code == HandshakeCode::Ack {
            return Ok(Self::Ack);
        }

        let arg = parts
            .next()
            .ok_or(HandshakeDecodeError::MissingArgument(code))?;

        match code {
            HandshakeCode::Ack => Ok(Self::Ack),
            HandshakeCode::Register => Ok(Self::Register {
                name: check_name(arg)?,
            }),
            HandshakeCode::Await => Ok(Self::Await {
                target: check_name(arg)?,
            }),
            HandshakeCode::Hello => Ok(Self::Hello {
                name: check_name(arg)?,
            }),
            HandshakeCode::Arrived => {
                let peer = arg
                    .parse::<AddressKey>()
                    .map_err(|_| HandshakeDecodeError::InvalidAddress(arg.to_string()))?;
                Ok(Self::Arrived { peer })
            }
        }
    }
}

impl fmt::Display for HandshakePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code().as_u8();
        match self {
            Self::Ack => write!(f, "{}", code),
            Self::Register { name } | Self::Hello { name } => write!(f, "{} {}", code, name),
            Self::Await { target } => write!(f, "{} {}", code, target),
            Self::Arrived { peer } => write!(f, "{} {}", code, peer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_text() {
        assert_eq!(HandshakePacket::Ack.to_bytes(), b"0");
        assert_eq!(
            HandshakePacket::Register {
                name: "alice".to_string()
            }
            .to_string(),
            "1 alice"
        );
        assert_eq!(
            HandshakePacket::Await {
                target: "bob".to_string()
            }
            .to_string(),
            "2 bob"
        );
        let peer: AddressKey = "10.0.0.2:5000".parse().unwrap();
        assert_eq!(HandshakePacket::Arrived { peer }.to_string(), "3 10.0.0.2:5000");
    }

    #[test]
    fn test_parse_register() {
        let packet = HandshakePacket::from_bytes(b"1 alice").unwrap();
        assert_eq!(
            packet,
            HandshakePacket::Register {
                name: "alice".to_string()
            }
        );
    }

    #[test]
    fn test_parse_ignores_extra_tokens_and_newline() {
        let packet = HandshakePacket::from_bytes(b"4 bob trailing words\n").unwrap();
        assert_eq!(
            packet,
            HandshakePacket::Hello {
                name: "bob".to_string()
            }
        );
    }

    #[test]
    fn test_parse_ack_without_argument() {
        assert_eq!(HandshakePacket::from_bytes(b"0").unwrap(), HandshakePacket::Ack);
    }

    #[test]
    fn test_parse_arrived_address() {
        let packet = HandshakePacket::from_bytes(b"3 127.0.0.1:9000").unwrap();
        match packet {
            HandshakePacket::Arrived { peer } => {
                assert_eq!(peer.to_socket_addr().unwrap().port(), 9000);
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            HandshakePacket::from_bytes(b""),
            Err(HandshakeDecodeError::Empty)
        );
        assert_eq!(
            HandshakePacket::from_bytes(&[0xff, 0xfe]),
            Err(HandshakeDecodeError::NotUtf8)
        );
        assert_eq!(
            HandshakePacket::from_bytes(b"Register alice"),
            Err(HandshakeDecodeError::InvalidCode("Register".to_string()))
        );
        assert_eq!(
            HandshakePacket::from_bytes(b"9 alice"),
            Err(HandshakeDecodeError::UnknownCode(9))
        );
        assert_eq!(
            HandshakePacket::from_bytes(b"2"),
            Err(HandshakeDecodeError::MissingArgument(HandshakeCode::Await))
        );
        assert!(matches!(
            HandshakePacket::from_bytes(b"3 nowhere"),
            Err(HandshakeDecodeError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_name_too_long() {
        let long = format!("1 {}", "x".repeat(MAX_NAME_LEN + 1));
        assert_eq!(
            HandshakePacket::from_bytes(long.as_bytes()),
            Err(HandshakeDecodeError::NameTooLong {
                len: MAX_NAME_LEN + 1
            })
        );
    }

    #[test]
    fn test_envelope_json_is_not_a_handshake() {
        assert!(HandshakePacket::from_bytes(br#"{"Type":1,"Data":{}}"#).is_err());
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("alice"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("two words"));
        assert!(!is_valid_name(&"y".repeat(MAX_NAME_LEN + 1)));
    }
}
