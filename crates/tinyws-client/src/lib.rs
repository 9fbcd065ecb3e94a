//! # tinyws-client
//!
//! The client side of the protocol: sends an upgrade request, masks every
//! frame it writes, and reads unmasked frames back.
//!
//! ```no_run
//! # async fn demo() -> tinyws_client::Result<()> {
//! let mut client = tinyws_client::WsClient::connect("ws://127.0.0.1:8081/echo", None).await?;
//! client.send_text("ping").await?;
//! let stopped = client.receive_until("stop", |msg| { println!("{msg}"); true }).await?;
//! client.close().await?;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod url;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tinyws_core::{Frame, FrameCodec, Opcode, ProtocolError, UpgradeRequest, UpgradeResponseCodec};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

pub use error::{ClientError, Result};
pub use url::WsUrl;

const CLOSE_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// An upgraded client connection.
pub struct WsClient {
    url: WsUrl,
    framed: Framed<TcpStream, FrameCodec>,
    read_timeout: Option<Duration>,
}

impl WsClient {
    /// Connect to `url` and perform the upgrade, optionally sending `Origin`.
    pub async fn connect(url: &str, origin: Option<&str>) -> Result<Self> {
        let url: WsUrl = url.parse()?;
        let stream = TcpStream::connect((url.host.as_str(), url.port)).await?;
        stream.set_nodelay(true)?;

        let mut request = UpgradeRequest::new(url.authority(), url.path.clone());
        if let Some(origin) = origin {
            request = request.with_origin(origin);
        }
        let mut framed = Framed::new(stream, UpgradeResponseCodec::for_request(&request));
        framed.send(request).await.map_err(ClientError::Handshake)?;
        match framed.next().await {
            Some(Ok(_accepted)) => {}
            Some(Err(e)) => return Err(ClientError::Handshake(e)),
            None => return Err(ClientError::ConnectionClosed),
        }
        debug!(%url, "websocket connected");

        Ok(Self {
            url,
            framed: framed.map_codec(|_| FrameCodec::client()),
            read_timeout: None,
        })
    }

    /// Fail reads that wait longer than `timeout`. `None` waits forever.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// The URL this client connected to.
    pub fn url(&self) -> &WsUrl {
        &self.url
    }

    /// Send one masked text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.framed
            .send(Frame::text(bytes::Bytes::copy_from_slice(text.as_bytes())))
            .await?;
        Ok(())
    }

    /// Next frame from the server, or `None` once the stream ends.
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        let next = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.framed.next())
                .await
                .map_err(|_| ProtocolError::IdleTimeout(limit))?,
            None => self.framed.next().await,
        };
        Ok(next.transpose()?)
    }

    /// Feed text messages to `on_message` until `stop` arrives.
    ///
    /// Returns `true` when `stop` was received. Returns `false` when the
    /// server closed the connection or `on_message` returned `false`.
    pub async fn receive_until<F>(&mut self, stop: &str, mut on_message: F) -> Result<bool>
    where
        F: FnMut(&str) -> bool,
    {
        while let Some(frame) = self.recv().await? {
            match frame.opcode {
                Opcode::Text => {
                    let text = frame.text_lossy();
                    if text == stop {
                        return Ok(true);
                    }
                    if !on_message(&text) {
                        return Ok(false);
                    }
                }
                Opcode::Close => return Ok(false),
                other => trace!(opcode = %other, "ignoring frame"),
            }
        }
        Ok(false)
    }

    /// Send a close frame, wait briefly for the reply, and shut the socket.
    pub async fn close(mut self) -> Result<()> {
        match self.framed.send(Frame::close()).await {
            Ok(()) => {}
            Err(e) if e.is_disconnect() => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let drain = async {
            while let Some(Ok(frame)) = self.framed.next().await {
                if frame.opcode == Opcode::Close {
                    break;
                }
            }
        };
        if tokio::time::timeout(CLOSE_REPLY_TIMEOUT, drain).await.is_err() {
            debug!(url = %self.url, "no close reply");
        }
        let _ = self.framed.close().await;
        Ok(())
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("url", &self.url)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn rejected_upgrade_is_a_handshake_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"HTTP/1.1 404 Not Found\r\n\r\n").await.unwrap();
        });

        let url = format!("ws://{addr}/missing");
        let result = WsClient::connect(&url, None).await;
        assert_matches!(
            result,
            Err(ClientError::Handshake(ProtocolError::UpgradeRejected(_)))
        );
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_server_is_a_handshake_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });

        let result = WsClient::connect(&format!("ws://{addr}/"), None).await;
        assert!(matches!(
            result,
            Err(ClientError::Handshake(_) | ClientError::ConnectionClosed | ClientError::Io(_))
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn bad_url_fails_before_connecting() {
        assert_matches!(
            WsClient::connect("http://localhost/", None).await,
            Err(ClientError::InvalidUrl(_))
        );
    }
}
