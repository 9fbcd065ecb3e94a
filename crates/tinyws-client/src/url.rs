//! Minimal `ws://` URL parsing.

use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;

/// Parsed `ws://host[:port][/path]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    /// Host name or address. IPv6 literals are stored without brackets.
    pub host: String,
    /// TCP port, 80 when omitted.
    pub port: u16,
    /// Request path including any query, `/` when omitted.
    pub path: String,
}

impl WsUrl {
    /// `host:port` for the `Host` header, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for WsUrl {
    type Err = ClientError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ClientError::InvalidUrl(format!("{url}: {reason}"));
        let rest = url
            .strip_prefix("ws://")
            .ok_or_else(|| invalid("only ws:// is supported"))?;
        let (authority, path) = match rest.find(['/', '?']) {
            Some(i) if rest.as_bytes()[i] == b'/' => (&rest[..i], rest[i..].to_string()),
            Some(i) => (&rest[..i], format!("/{}", &rest[i..])),
            None => (rest, "/".to_string()),
        };
        let parse_port = |port: &str| port.parse::<u16>().map_err(|_| invalid("bad port"));
        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unclosed IPv6 literal"))?;
            match after.strip_prefix(':') {
                Some(port) => (host, parse_port(port)?),
                None if after.is_empty() => (host, 80),
                None => return Err(invalid("junk after IPv6 literal")),
            }
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, parse_port(port)?),
                None => (authority, 80),
            }
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            path,
        })
    }
}

impl fmt::Display for WsUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws://{}{}", self.authority(), self.path)
    }
}
