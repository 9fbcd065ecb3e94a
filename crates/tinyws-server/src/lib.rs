//! # tinyws-server
//!
//! A WebSocket server written directly against `tokio::net::TcpListener`.
//!
//! - [`WsServer`]: route table, fallback, observer, and the accept loop
//! - [`websocket`]: per-connection sessions, [`SenderHandle`], and [`Broadcaster`]
//! - [`hooks`]: the [`MessagePolicy`] and [`SessionObserver`] seams
//! - [`policies`]: echo, subscribe, and ticker demos
//! - [`shutdown`], [`metrics`], [`config`]: process plumbing

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod policies;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::{DispatchError, Result, SendError, ServerError};
pub use hooks::{MessagePolicy, ObserverChain, SessionInfo, SessionObserver, TracingObserver};
pub use server::WsServer;
pub use shutdown::ShutdownCoordinator;
pub use websocket::{Broadcaster, RoundReport, SenderHandle, SessionId};
