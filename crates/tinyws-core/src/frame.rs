//! Frame model and XOR masking.
//!
//! A [`Frame`] is the decoded form of one unit on the wire. Only `Text` and
//! `Close` carry meaning for the session layer; every other opcode is still
//! decoded so the byte stream stays aligned, then ignored by the caller.

use std::fmt;

use bytes::Bytes;

/// Frame opcode (low nibble of the first header byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented message (never produced here).
    Continuation,
    /// UTF-8 text payload.
    Text,
    /// Binary payload.
    Binary,
    /// Connection close.
    Close,
    /// Any other 4-bit value (ping, pong, reserved). Read, never acted on.
    Other(u8),
}

impl Opcode {
    /// Wire value of this opcode.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Other(v) => v & 0x0F,
        }
    }
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuation => f.write_str("continuation"),
            Self::Text => f.write_str("text"),
            Self::Binary => f.write_str("binary"),
            Self::Close => f.write_str("close"),
            Self::Other(v) => write!(f, "0x{v:X}"),
        }
    }
}

/// One decoded frame.
///
/// `payload` is always unmasked. The masking key the peer used is kept only
/// for inspection; its presence is what "masked" means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// FIN bit.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Masking key, present iff the mask bit was set.
    pub masking_key: Option<[u8; 4]>,
    /// Unmasked payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// A final, unmasked frame.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            masking_key: None,
            payload: payload.into(),
        }
    }

    /// A text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    /// A close frame with an empty payload.
    pub fn close() -> Self {
        Self::new(Opcode::Close, Bytes::new())
    }

    /// Whether the mask bit was set.
    pub fn is_masked(&self) -> bool {
        self.masking_key.is_some()
    }

    /// Payload length as declared on the wire.
    pub fn payload_length(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Payload as UTF-8, lossily.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// XOR `payload` with `key`, index-wise modulo 4.
///
/// Self-inverse: applying the same key twice restores the input.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i & 0x3];
    }
}

/// Number of header bytes needed for a payload of `payload_len` bytes.
pub const fn header_len(payload_len: usize, masked: bool) -> usize {
    let length_bytes = if payload_len < 126 {
        0
    } else if payload_len <= 0xFFFF {
        2
    } else {
        8
    };
    2 + length_bytes + if masked { 4 } else { 0 }
}
