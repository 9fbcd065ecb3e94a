//! `WsServer`: route table plus the TCP accept loop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::hooks::{MessagePolicy, SessionObserver, TracingObserver};
use crate::metrics::WS_CONNECTIONS_TOTAL;
use crate::websocket::session::{self, SessionContext};

/// A WebSocket server on a raw TCP listener.
///
/// Routes, the fallback, and the observer are fixed once [`listen`](Self::listen)
/// has been called.
pub struct WsServer {
    config: ServerConfig,
    routes: HashMap<String, Arc<dyn MessagePolicy>>,
    fallback: Option<Arc<dyn MessagePolicy>>,
    observer: Arc<dyn SessionObserver>,
    listening: bool,
}

impl WsServer {
    /// Server with no routes.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            routes: HashMap::new(),
            fallback: None,
            observer: Arc::new(TracingObserver),
            listening: false,
        }
    }

    /// Handle upgrades for `path` (query string ignored) with `policy`.
    pub fn route(
        &mut self,
        path: impl Into<String>,
        policy: Arc<dyn MessagePolicy>,
    ) -> Result<&mut Self> {
        self.ensure_open()?;
        let path = path.into();
        if self.routes.insert(path.clone(), policy).is_some() {
            debug!(%path, "route replaced");
        }
        Ok(self)
    }

    /// Handle upgrades for any path without its own route.
    pub fn fallback(&mut self, policy: Arc<dyn MessagePolicy>) -> Result<&mut Self> {
        self.ensure_open()?;
        self.fallback = Some(policy);
        Ok(self)
    }

    /// Replace the default logging observer.
    pub fn observer(&mut self, observer: Arc<dyn SessionObserver>) -> Result<&mut Self> {
        self.ensure_open()?;
        self.observer = observer;
        Ok(self)
    }

    /// The configuration this server binds with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether [`listen`](Self::listen) has succeeded.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Registered route paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Bind and start accepting until `shutdown` is cancelled.
    ///
    /// Returns the bound address and the accept-loop task. Cancelling the
    /// token drops the listener; sessions already running are left to end by
    /// themselves.
    pub async fn listen(
        &mut self,
        shutdown: CancellationToken,
    ) -> Result<(SocketAddr, JoinHandle<()>)> {
        self.ensure_open()?;
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        self.listening = true;

        let ctx = Arc::new(SessionContext {
            config: self.config.clone(),
            routes: self.routes.clone(),
            fallback: self.fallback.clone(),
            observer: Arc::clone(&self.observer),
        });
        info!(%local_addr, routes = ?self.paths(), "websocket server listening");
        let task = tokio::spawn(accept_loop(listener, ctx, shutdown));
        Ok((local_addr, task))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.listening {
            Err(ServerError::RoutesFrozen)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for WsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsServer")
            .field("config", &self.config)
            .field("paths", &self.paths())
            .field("fallback", &self.fallback.is_some())
            .field("listening", &self.listening)
            .finish_non_exhaustive()
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<SessionContext>, shutdown: CancellationToken) {
    loop {
        let (stream, peer) = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(error) => {
                    // e.g. EMFILE; pause before retrying
                    warn!(%error, "accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
            },
        };
        metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
        if let Err(error) = stream.set_nodelay(true) {
            debug!(%peer, %error, "could not set TCP_NODELAY");
        }
        let _ = tokio::spawn(session::run(stream, peer, Arc::clone(&ctx)));
    }
    info!("websocket listener stopped");
}
