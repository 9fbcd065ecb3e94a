//! Frame codec (RFC 6455 section 5.2 subset).
//!
//! [`FrameCodec`] plugs into `tokio_util::codec::Framed`. Decoding waits until
//! a whole frame is buffered, so a partial frame is never handed to the
//! session. If the stream ends mid-frame, `decode_eof` reports
//! [`ProtocolError::TruncatedFrame`].
//!
//! Encoding always produces a single final frame. Server frames go out
//! unmasked; client frames carry a fresh random masking key.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};
use crate::frame::{Frame, Opcode, apply_mask, header_len};

/// Default payload cap (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Which side of the connection this codec speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts connections; sends unmasked frames.
    Server,
    /// Initiates connections; sends masked frames.
    Client,
}

/// Length-prefixed WebSocket frame codec.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    role: Role,
    max_frame_size: usize,
}

impl FrameCodec {
    /// Codec for the accepting side.
    pub fn server() -> Self {
        Self {
            role: Role::Server,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Codec for the initiating side.
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Override the payload cap.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// The endpoint role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The payload cap.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    fn checked_len(&self, declared: u64) -> Result<usize> {
        let too_large = || ProtocolError::FrameTooLarge {
            length: declared,
            max: self.max_frame_size,
        };
        let len = usize::try_from(declared).map_err(|_| too_large())?;
        if len > self.max_frame_size {
            return Err(too_large());
        }
        Ok(len)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::server()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < 2 {
            return Ok(None);
        }
        let fin = src[0] & 0x80 != 0;
        let opcode = Opcode::from(src[0]);
        let masked = src[1] & 0x80 != 0;

        let (declared, length_end) = match src[1] & 0x7F {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (u64::from(u16::from_be_bytes([src[2], src[3]])), 4)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&src[2..10]);
                (u64::from_be_bytes(buf), 10)
            }
            n => (u64::from(n), 2),
        };
        let len = self.checked_len(declared)?;

        let key_end = length_end + if masked { 4 } else { 0 };
        let frame_end = key_end + len;
        if src.len() < frame_end {
            src.reserve(frame_end - src.len());
            return Ok(None);
        }

        let masking_key = masked.then(|| {
            [
                src[key_end - 4],
                src[key_end - 3],
                src[key_end - 2],
                src[key_end - 1],
            ]
        });
        src.advance(key_end);
        let mut payload = src.split_to(len);
        if let Some(key) = masking_key {
            apply_mask(&mut payload, key);
        }
        tracing::trace!(%opcode, len, masked, "decoded frame");

        Ok(Some(Frame {
            fin,
            opcode,
            masking_key,
            payload: payload.freeze(),
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedFrame),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        if frame.payload.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                length: frame.payload_length(),
                max: self.max_frame_size,
            });
        }
        let key = match self.role {
            Role::Server => None,
            Role::Client => Some(rand::random::<[u8; 4]>()),
        };
        encode_frame(frame.opcode, &frame.payload, key, dst);
        Ok(())
    }
}

/// Append one final frame to `dst`.
///
/// With `masking_key` set the mask bit is raised, the key follows the length,
/// and the payload is written masked.
pub fn encode_frame(
    opcode: Opcode,
    payload: &[u8],
    masking_key: Option<[u8; 4]>,
    dst: &mut BytesMut,
) {
    dst.reserve(header_len(payload.len(), masking_key.is_some()) + payload.len());
    dst.put_u8(0x80 | opcode.as_u8());

    let mask_bit = if masking_key.is_some() { 0x80 } else { 0x00 };
    match payload.len() {
        n if n < 126 => dst.put_u8(mask_bit | n as u8),
        n if n <= 0xFFFF => {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(n as u16);
        }
        n => {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(n as u64);
        }
    }

    match masking_key {
        Some(key) => {
            dst.put_slice(&key);
            let start = dst.len();
            dst.put_slice(payload);
            apply_mask(&mut dst[start..], key);
        }
        None => dst.put_slice(payload),
    }
}

/// Encode an unmasked server frame into a standalone buffer.
pub fn encode(opcode: Opcode, payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    encode_frame(opcode, payload, None, &mut dst);
    dst.freeze()
}
