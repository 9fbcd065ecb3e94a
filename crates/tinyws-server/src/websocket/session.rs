//! One connection from upgrade to close.
//!
//! The session task owns the read half and drives the state machine
//! `Handshaking -> Open -> Closing -> Closed`. A second task owns the write
//! half and drains the session's outbound queue, so every write on the socket
//! goes through exactly one place.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, Sink, SinkExt, StreamExt};
use tinyws_core::{
    Frame, FrameCodec, Opcode, ProtocolError, SwitchingProtocols, UpgradeRequestCodec,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::sender::{Outbound, SenderHandle, SessionId};
use crate::config::ServerConfig;
use crate::error::DispatchError;
use crate::hooks::{MessagePolicy, SessionInfo, SessionObserver};
use crate::metrics::{
    WS_DISCONNECTIONS_TOTAL, WS_DISPATCH_ERRORS_TOTAL, WS_FRAMES_RECEIVED_TOTAL,
    WS_FRAMES_SENT_TOTAL, WS_HANDSHAKE_FAILURES_TOTAL, WS_IDLE_TIMEOUTS_TOTAL, WS_SESSIONS_ACTIVE,
};

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the upgrade request.
    Handshaking,
    /// Exchanging frames.
    Open,
    /// Close frame received, reply queued.
    Closing,
    /// Read loop finished.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Frozen route table and collaborators shared by every session.
pub(crate) struct SessionContext {
    pub(crate) config: ServerConfig,
    pub(crate) routes: HashMap<String, Arc<dyn MessagePolicy>>,
    pub(crate) fallback: Option<Arc<dyn MessagePolicy>>,
    pub(crate) observer: Arc<dyn SessionObserver>,
}

impl SessionContext {
    fn policy_for(&self, path: &str) -> Option<Arc<dyn MessagePolicy>> {
        self.routes
            .get(path)
            .or(self.fallback.as_ref())
            .map(Arc::clone)
    }
}

struct Session {
    info: SessionInfo,
    state: SessionState,
}

impl Session {
    fn transition(&mut self, next: SessionState) {
        trace!(session_id = %self.info.id, from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

/// Serve one accepted connection until it closes.
pub(crate) async fn run<T>(io: T, peer: SocketAddr, ctx: Arc<SessionContext>)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Some((framed, path, policy)) = accept_upgrade(io, peer, &ctx).await else {
        metrics::counter!(WS_HANDSHAKE_FAILURES_TOTAL).increment(1);
        return;
    };

    let mut session = Session {
        info: SessionInfo {
            id: SessionId::next(),
            peer,
            path,
        },
        state: SessionState::Handshaking,
    };
    let (sender, outbound) = SenderHandle::with_id(session.info.id, ctx.config.outbound_queue);
    let (sink, mut frames) = framed.split();
    let stop_writer = CancellationToken::new();
    let writer = tokio::spawn(write_loop(
        sink,
        outbound,
        stop_writer.clone(),
        ctx.config.read_timeout,
        session.info.id,
    ));

    session.transition(SessionState::Open);
    metrics::gauge!(WS_SESSIONS_ACTIVE).increment(1.0);
    ctx.observer.on_open(&session.info);

    let idle = ctx.config.read_timeout;
    loop {
        let frame = match timeout(idle, frames.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(error))) => {
                ctx.observer.on_transport_error(&session.info, &error);
                break;
            }
            Ok(None) => {
                debug!(session_id = %session.info.id, "peer closed the stream");
                break;
            }
            Err(_) => {
                metrics::counter!(WS_IDLE_TIMEOUTS_TOTAL).increment(1);
                ctx.observer.on_transport_timeout(&session.info);
                break;
            }
        };
        metrics::counter!(WS_FRAMES_RECEIVED_TOTAL, "opcode" => frame.opcode.to_string())
            .increment(1);

        match frame.opcode {
            Opcode::Close => {
                session.transition(SessionState::Closing);
                if let Err(error) = sender.send_frame(Frame::close()).await {
                    debug!(session_id = %session.info.id, %error, "close reply not written");
                }
                break;
            }
            Opcode::Text => {
                let text = frame.text_lossy();
                let dispatch = policy.on_message(&session.info, &sender, &text);
                let dispatched = AssertUnwindSafe(dispatch)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(DispatchError::Panicked(panic_message(&*panic))));
                if let Err(error) = dispatched {
                    metrics::counter!(WS_DISPATCH_ERRORS_TOTAL).increment(1);
                    ctx.observer.on_dispatch_error(&session.info, &error);
                    break;
                }
            }
            other => {
                debug!(session_id = %session.info.id, opcode = %other, "ignoring frame");
            }
        }
    }

    session.transition(SessionState::Closed);
    stop_writer.cancel();
    drop(sender);
    let _ = writer.await;

    metrics::gauge!(WS_SESSIONS_ACTIVE).decrement(1.0);
    metrics::counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    ctx.observer.on_close(&session.info);
}

/// Read the upgrade request, pick the route, and answer `101`.
///
/// Any failure closes the connection without a response.
async fn accept_upgrade<T>(
    io: T,
    peer: SocketAddr,
    ctx: &SessionContext,
) -> Option<(Framed<T, FrameCodec>, String, Arc<dyn MessagePolicy>)>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(io, UpgradeRequestCodec::new(ctx.config.max_handshake_bytes));
    let upgrade = match timeout(ctx.config.read_timeout, framed.next()).await {
        Ok(Some(Ok(upgrade))) => upgrade,
        Ok(Some(Err(error))) => {
            debug!(%peer, %error, "upgrade refused");
            return None;
        }
        Ok(None) => {
            debug!(%peer, "peer closed before upgrading");
            return None;
        }
        Err(_) => {
            debug!(%peer, "upgrade request timed out");
            return None;
        }
    };

    let Some(policy) = ctx.policy_for(&upgrade.path) else {
        debug!(%peer, path = %upgrade.path, "no route for path");
        return None;
    };

    if let Err(error) = framed.send(SwitchingProtocols::from(&upgrade)).await {
        debug!(%peer, %error, "failed to write upgrade response");
        return None;
    }

    let codec = FrameCodec::server().with_max_frame_size(ctx.config.max_frame_size);
    Some((framed.map_codec(|_| codec), upgrade.path, policy))
}

/// Drain the outbound queue into the socket until stopped or broken.
///
/// A write that the peer does not drain within `stall` fails the frame and
/// stops the writer. Cancelling `stop` abandons an in-flight write, so a
/// peer that stopped reading cannot hold the session open. Every frame still
/// queued when the writer exits resolves to a closed transport.
async fn write_loop<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Outbound>,
    stop: CancellationToken,
    stall: Duration,
    id: SessionId,
) where
    S: Sink<Frame, Error = ProtocolError> + Unpin,
{
    loop {
        let out = tokio::select! {
            biased;
            () = stop.cancelled() => return,
            next = outbound.recv() => match next {
                Some(out) => out,
                None => break,
            },
        };

        let closing = out.frame.opcode == Opcode::Close;
        let frame = out.frame.clone();
        let result = tokio::select! {
            biased;
            () = stop.cancelled() => {
                debug!(session_id = %id, "session ended with a write in flight");
                out.complete(Err(io::ErrorKind::BrokenPipe.into()));
                return;
            }
            sent = timeout(stall, sink.send(frame)) => match sent {
                Ok(sent) => sent.map_err(into_io),
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "peer stopped reading")),
            },
        };
        let failed = result.is_err();
        if failed {
            debug!(session_id = %id, "write failed, stopping writer");
        } else {
            metrics::counter!(WS_FRAMES_SENT_TOTAL).increment(1);
        }
        out.complete(result);
        if failed {
            return;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn into_io(error: ProtocolError) -> io::Error {
    match error {
        ProtocolError::Io(e) => e,
        other => io::Error::other(other),
    }
}
