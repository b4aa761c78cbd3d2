//! Frame opcodes (RFC 6455 Section 5.2).

use std::fmt;

use crate::error::Error;

/// Frame opcode. Reserved values never make it past parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    /// Envelopes travel in these.
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, Ping and Pong; these may interleave with a fragmented message.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        (self as u8) & 0x8 != 0
    }
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    /// Decode the low nibble of the first header byte.
    fn try_from(nibble: u8) -> Result<Self, Error> {
        Ok(match nibble {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            reserved => return Err(Error::ReservedOpcode(reserved)),
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpCode::Continuation => "continuation",
            OpCode::Text => "text",
            OpCode::Binary => "binary",
            OpCode::Close => "close",
            OpCode::Ping => "ping",
            OpCode::Pong => "pong",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_nibbles() {
        for opcode in [
            OpCode::Continuation,
            OpCode::Text,
            OpCode::Binary,
            OpCode::Close,
            OpCode::Ping,
            OpCode::Pong,
        ] {
            assert_eq!(OpCode::try_from(opcode.as_u8()), Ok(opcode));
        }
    }

    #[test]
    fn test_reserved_nibbles() {
        for nibble in (0x3..=0x7).chain(0xB..=0xF) {
            assert_eq!(OpCode::try_from(nibble), Err(Error::ReservedOpcode(nibble)));
        }
    }

    #[test]
    fn test_control_split() {
        assert!(OpCode::Close.is_control());
        assert!(OpCode::Pong.is_control());
        assert!(!OpCode::Text.is_control());
        assert!(!OpCode::Continuation.is_control());
        assert_eq!(OpCode::Ping.to_string(), "ping");
    }
}
