//! # tinyws-core
//!
//! The wire-level half of the WebSocket engine. Nothing in this crate touches
//! a socket directly; every type is either a pure function or a
//! `tokio_util::codec` codec that the server and client crates drive.
//!
//! - **Frames** ([`frame`]): `Opcode`, `Frame`, and symmetric XOR masking
//! - **Frame codec** ([`codec`]): length-prefixed frame decode/encode for both endpoint roles
//! - **Handshake** ([`handshake`]): HTTP/1.1 upgrade negotiation and accept-key computation
//! - **Errors** ([`error`]): the protocol error taxonomy shared by every crate

#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod frame;
pub mod handshake;

pub use codec::{DEFAULT_MAX_FRAME_SIZE, FrameCodec, Role, encode, encode_frame};
pub use error::{ProtocolError, Result};
pub use frame::{Frame, Opcode, apply_mask, header_len};
pub use handshake::{
    DEFAULT_MAX_HANDSHAKE_BYTES, SwitchingProtocols, Upgrade, UpgradeAccepted, UpgradeRequest,
    UpgradeRequestCodec, UpgradeResponseCodec, compute_accept_key, negotiate,
};
