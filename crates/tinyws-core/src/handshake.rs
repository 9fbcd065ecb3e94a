//! HTTP/1.1 upgrade handshake (RFC 6455 section 4.2).
//!
//! - [`negotiate`]: parse a raw request head and compute the accept key
//! - [`compute_accept_key`]: SHA-1 + Base64 of the client key and the fixed GUID
//! - [`UpgradeRequestCodec`]: server side; decodes the request head, encodes the `101` reply
//! - [`UpgradeResponseCodec`]: client side; encodes the request, validates the `101` reply
//!
//! Acceptance is deliberately lenient: the request line must begin with `GET`
//! and a `Sec-WebSocket-Key` header must be present. Other upgrade headers are
//! not checked. A failed negotiation closes the connection without a reply.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::{BufMut, BytesMut};
use sha1::{Digest, Sha1};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Default cap on the size of an HTTP request or response head.
pub const DEFAULT_MAX_HANDSHAKE_BYTES: usize = 8 * 1024;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Compute the `Sec-WebSocket-Accept` value for a client key.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// A successfully negotiated upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgrade {
    /// Request-target path, query string removed.
    pub path: String,
    /// The client's `Sec-WebSocket-Key`.
    pub client_key: String,
    /// The value to send back in `Sec-WebSocket-Accept`.
    pub accept_key: String,
}

/// Parse a raw HTTP request head and negotiate the upgrade.
pub fn negotiate(request: &str) -> Result<Upgrade> {
    let mut lines = request.lines();
    let request_line = lines.next().unwrap_or_default();
    if !request_line.starts_with("GET") {
        return Err(ProtocolError::NotAWebSocketUpgrade(
            "request line does not start with GET".into(),
        ));
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .and_then(|target| target.split('?').next())
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
        .to_string();

    let client_key = lines
        .find_map(|line| header_value(line, "Sec-WebSocket-Key"))
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            ProtocolError::NotAWebSocketUpgrade("missing Sec-WebSocket-Key header".into())
        })?
        .to_string();

    let accept_key = compute_accept_key(&client_key);
    Ok(Upgrade {
        path,
        client_key,
        accept_key,
    })
}

/// The value of `line` if it is the header `name` (case-insensitive).
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
}

/// Offset just past the blank line ending an HTTP head.
fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// The `101 Switching Protocols` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchingProtocols {
    /// `Sec-WebSocket-Accept` value.
    pub accept_key: String,
}

impl SwitchingProtocols {
    /// Render the reply exactly as it goes on the wire.
    pub fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            self.accept_key
        )
    }
}

impl From<&Upgrade> for SwitchingProtocols {
    fn from(upgrade: &Upgrade) -> Self {
        Self {
            accept_key: upgrade.accept_key.clone(),
        }
    }
}

/// Server-side handshake codec.
///
/// Only the request head is consumed; any bytes the client pipelined after it
/// stay in the read buffer for the frame codec that replaces this one.
#[derive(Debug, Clone)]
pub struct UpgradeRequestCodec {
    max_head_bytes: usize,
}

impl UpgradeRequestCodec {
    /// Codec with the given head size cap.
    pub fn new(max_head_bytes: usize) -> Self {
        Self { max_head_bytes }
    }
}

impl Default for UpgradeRequestCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HANDSHAKE_BYTES)
    }
}

impl Decoder for UpgradeRequestCodec {
    type Item = Upgrade;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Upgrade>> {
        let Some(end) = head_end(&src[..]) else {
            if src.len() > self.max_head_bytes {
                return Err(ProtocolError::NotAWebSocketUpgrade(format!(
                    "request head exceeds {} bytes",
                    self.max_head_bytes
                )));
            }
            return Ok(None);
        };
        if end > self.max_head_bytes {
            return Err(ProtocolError::NotAWebSocketUpgrade(format!(
                "request head exceeds {} bytes",
                self.max_head_bytes
            )));
        }
        let head = src.split_to(end);
        let text = std::str::from_utf8(&head).map_err(|_| {
            ProtocolError::NotAWebSocketUpgrade("request head is not valid UTF-8".into())
        })?;
        negotiate(text).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Upgrade>> {
        match self.decode(buf)? {
            Some(upgrade) => Ok(Some(upgrade)),
            None if buf.is_empty() => Ok(None),
            None => Err(ProtocolError::NotAWebSocketUpgrade(
                "connection closed before the request head ended".into(),
            )),
        }
    }
}

impl Encoder<SwitchingProtocols> for UpgradeRequestCodec {
    type Error = ProtocolError;

    fn encode(&mut self, reply: SwitchingProtocols, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(reply.to_http().as_bytes());
        Ok(())
    }
}

/// A client's upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// `Host` header value (`host:port`).
    pub host: String,
    /// Request-target path.
    pub path: String,
    /// Optional `Origin` header.
    pub origin: Option<String>,
    /// Base64 of 16 random bytes.
    pub key: String,
}

impl UpgradeRequest {
    /// A request with a fresh random key.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            origin: None,
            key: BASE64.encode(rand::random::<[u8; 16]>()),
        }
    }

    /// Set the `Origin` header.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The accept key a conforming server must answer with.
    pub fn expected_accept(&self) -> String {
        compute_accept_key(&self.key)
    }

    /// Render the request head.
    pub fn to_http(&self) -> String {
        let mut head = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n",
            self.path, self.host, self.key
        );
        if let Some(origin) = &self.origin {
            head.push_str("Origin: ");
            head.push_str(origin);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head
    }
}

/// Marker yielded once the server's `101` reply checks out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeAccepted;

/// Client-side handshake codec.
#[derive(Debug, Clone)]
pub struct UpgradeResponseCodec {
    expected_accept: String,
    max_head_bytes: usize,
}

impl UpgradeResponseCodec {
    /// Codec that validates the reply to `request`.
    pub fn for_request(request: &UpgradeRequest) -> Self {
        Self {
            expected_accept: request.expected_accept(),
            max_head_bytes: DEFAULT_MAX_HANDSHAKE_BYTES,
        }
    }
}

impl Decoder for UpgradeResponseCodec {
    type Item = UpgradeAccepted;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<UpgradeAccepted>> {
        let Some(end) = head_end(&src[..]) else {
            if src.len() > self.max_head_bytes {
                return Err(ProtocolError::UpgradeRejected(
                    "response head too large".into(),
                ));
            }
            return Ok(None);
        };
        let head = src.split_to(end);
        let text = String::from_utf8_lossy(&head);
        let mut lines = text.lines();

        let status = lines.next().unwrap_or_default();
        if status.split_whitespace().nth(1) != Some("101") {
            return Err(ProtocolError::UpgradeRejected(format!(
                "unexpected status line: {status}"
            )));
        }
        match lines.find_map(|line| header_value(line, "Sec-WebSocket-Accept")) {
            Some(accept) if accept == self.expected_accept => Ok(Some(UpgradeAccepted)),
            Some(accept) => Err(ProtocolError::UpgradeRejected(format!(
                "accept key mismatch: {accept}"
            ))),
            None => Err(ProtocolError::UpgradeRejected(
                "missing Sec-WebSocket-Accept header".into(),
            )),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<UpgradeAccepted>> {
        match self.decode(buf)? {
            Some(accepted) => Ok(Some(accepted)),
            None => Err(ProtocolError::UpgradeRejected(
                "connection closed during handshake".into(),
            )),
        }
    }
}

impl Encoder<UpgradeRequest> for UpgradeResponseCodec {
    type Error = ProtocolError;

    fn encode(&mut self, request: UpgradeRequest, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(request.to_http().as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SAMPLE: &str = "GET /chat?room=1 HTTP/1.1\r\n\
                          Host: localhost:8081\r\n\
                          Upgrade: websocket\r\n\
                          Connection: Upgrade\r\n\
                          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                          Sec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn accept_key_rfc_example() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn negotiate_extracts_path_and_key() {
        let upgrade = negotiate(SAMPLE).unwrap();
        assert_eq!(upgrade.path, "/chat");
        assert_eq!(upgrade.client_key, "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(upgrade.accept_key, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn negotiate_tolerates_header_case_and_spacing() {
        let request = "GET / HTTP/1.1\r\nsec-websocket-key :   abc==  \r\n\r\n";
        let upgrade = negotiate(request).unwrap();
        assert_eq!(upgrade.client_key, "abc==");
    }

    #[test]
    fn negotiate_rejects_non_get() {
        let request = SAMPLE.replacen("GET", "POST", 1);
        assert_matches!(negotiate(&request), Err(ProtocolError::NotAWebSocketUpgrade(_)));
    }

    #[test]
    fn negotiate_rejects_missing_key() {
        let request = "GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_matches!(negotiate(request), Err(ProtocolError::NotAWebSocketUpgrade(_)));
    }

    #[test]
    fn negotiate_rejects_empty_key() {
        let request = "GET / HTTP/1.1\r\nSec-WebSocket-Key:\r\n\r\n";
        assert_matches!(negotiate(request), Err(ProtocolError::NotAWebSocketUpgrade(_)));
    }

    #[test]
    fn negotiate_defaults_path_to_root() {
        let request = "GET\r\nSec-WebSocket-Key: k\r\n\r\n";
        assert_eq!(negotiate(request).unwrap().path, "/");
    }

    #[test]
    fn switching_protocols_wire_format() {
        let reply = SwitchingProtocols {
            accept_key: "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=".into(),
        };
        assert_eq!(
            reply.to_http(),
            "HTTP/1.1 101 Switching Protocols\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"
        );
    }

    #[test]
    fn request_codec_waits_for_blank_line() {
        let mut codec = UpgradeRequestCodec::default();
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nSec-WebSocket-Key: k\r\n");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\r\n");
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn request_codec_keeps_pipelined_bytes() {
        let mut codec = UpgradeRequestCodec::default();
        let mut buf = BytesMut::from(SAMPLE);
        buf.extend_from_slice(&[0x81, 0x80, 0, 0, 0, 0]);
        let upgrade = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(upgrade.path, "/chat");
        assert_eq!(&buf[..], &[0x81, 0x80, 0, 0, 0, 0]);
    }

    #[test]
    fn request_codec_rejects_oversized_head() {
        let mut codec = UpgradeRequestCodec::new(32);
        let mut buf = BytesMut::from(&[b'a'; 64][..]);
        assert_matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::NotAWebSocketUpgrade(_))
        );
    }

    #[test]
    fn request_codec_eof_mid_head_is_not_an_upgrade() {
        let mut codec = UpgradeRequestCodec::default();
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\n");
        assert_matches!(
            codec.decode_eof(&mut buf),
            Err(ProtocolError::NotAWebSocketUpgrade(_))
        );
    }

    #[test]
    fn request_codec_encodes_reply() {
        let mut codec = UpgradeRequestCodec::default();
        let mut dst = BytesMut::new();
        let upgrade = negotiate(SAMPLE).unwrap();
        codec
            .encode(SwitchingProtocols::from(&upgrade), &mut dst)
            .unwrap();
        assert!(dst.starts_with(b"HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(dst.ends_with(b"s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n"));
    }

    #[test]
    fn client_request_negotiates_on_server() {
        let request = UpgradeRequest::new("localhost:8081", "/ws").with_origin("http://localhost:8080");
        let head = request.to_http();
        assert!(head.contains("Origin: http://localhost:8080\r\n"));
        let upgrade = negotiate(&head).unwrap();
        assert_eq!(upgrade.path, "/ws");
        assert_eq!(upgrade.accept_key, request.expected_accept());
    }

    #[test]
    fn request_keys_are_random() {
        let a = UpgradeRequest::new("h", "/");
        let b = UpgradeRequest::new("h", "/");
        assert_ne!(a.key, b.key);
        assert_eq!(BASE64.decode(&a.key).unwrap().len(), 16);
    }

    #[test]
    fn response_codec_accepts_matching_reply() {
        let request = UpgradeRequest::new("h", "/");
        let mut codec = UpgradeResponseCodec::for_request(&request);
        let reply = SwitchingProtocols {
            accept_key: request.expected_accept(),
        };
        let mut buf = BytesMut::from(reply.to_http().as_str());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(UpgradeAccepted));
    }

    #[test]
    fn response_codec_rejects_wrong_accept() {
        let request = UpgradeRequest::new("h", "/");
        let mut codec = UpgradeResponseCodec::for_request(&request);
        let reply = SwitchingProtocols {
            accept_key: "bogus".into(),
        };
        let mut buf = BytesMut::from(reply.to_http().as_str());
        assert_matches!(codec.decode(&mut buf), Err(ProtocolError::UpgradeRejected(_)));
    }

    #[test]
    fn response_codec_rejects_non_101() {
        let request = UpgradeRequest::new("h", "/");
        let mut codec = UpgradeResponseCodec::for_request(&request);
        let mut buf = BytesMut::from("HTTP/1.1 400 Bad Request\r\n\r\n");
        assert_matches!(codec.decode(&mut buf), Err(ProtocolError::UpgradeRejected(_)));
    }

    #[test]
    fn response_codec_eof_is_rejection() {
        let request = UpgradeRequest::new("h", "/");
        let mut codec = UpgradeResponseCodec::for_request(&request);
        let mut buf = BytesMut::new();
        assert_matches!(
            codec.decode_eof(&mut buf),
            Err(ProtocolError::UpgradeRejected(_))
        );
    }
}
