//! # tinyws
//!
//! Command-line entry point: the echo server, the broadcast demo with its
//! client fleet, and a one-shot probe client.

#![deny(unsafe_code)]

mod fleet;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tinyws_client::WsClient;
use tinyws_logging::LoggingConfig;
use tinyws_server::policies::{DemoStats, EchoWithDelay, Subscribe, Ticker};
use tinyws_server::{
    Broadcaster, ObserverChain, ServerConfig, ShutdownCoordinator, TracingObserver, WsServer,
};
use tinyws_settings::Settings;
use tracing::info;

/// Raw-TCP WebSocket server and demos.
#[derive(Debug, Parser)]
#[command(name = "tinyws", version, about = "Raw-TCP WebSocket server and demos")]
struct Cli {
    /// Settings file (defaults to `~/.tinyws/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Echo every text message back three times.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind.
        #[arg(long)]
        port: Option<u16>,
        /// Only upgrade this path (default: any path).
        #[arg(long)]
        path: Option<String>,
    },
    /// Broadcast to a fleet of reconnecting clients and report stats.
    BroadcastDemo {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind.
        #[arg(long)]
        port: Option<u16>,
        /// Number of clients to launch.
        #[arg(long)]
        clients: Option<usize>,
    },
    /// Send one message and print the replies.
    Probe {
        /// Server URL.
        #[arg(long, default_value = "ws://127.0.0.1:8081/echo")]
        url: String,
        /// Message to send.
        #[arg(long, default_value = "Hello WebSocket")]
        message: String,
        /// Replies to wait for.
        #[arg(long, default_value_t = 3)]
        replies: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => tinyws_settings::load_settings_from_path(path),
        None => tinyws_settings::load_settings(),
    }
    .context("failed to load settings")?;
    let _ = tinyws_logging::init_logging(&LoggingConfig::from(&settings.logging));

    match cli.command {
        Command::Serve { host, port, path } => serve(&settings, host, port, path).await,
        Command::BroadcastDemo {
            host,
            port,
            clients,
        } => broadcast_demo(&settings, host, port, clients).await,
        Command::Probe {
            url,
            message,
            replies,
        } => probe(&settings, &url, &message, replies).await,
    }
}

fn server_config(settings: &Settings, host: Option<String>, port: Option<u16>) -> ServerConfig {
    let mut config = ServerConfig::from(&settings.server);
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config
}

async fn serve(
    settings: &Settings,
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
) -> Result<()> {
    let metrics = tinyws_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;
    let mut server = WsServer::new(server_config(settings, host, port));
    let echo = Arc::new(EchoWithDelay::from(&settings.demo));
    let _ = match path {
        Some(path) => server.route(path, echo)?,
        None => server.fallback(echo)?,
    };

    let config = server.config();
    info!(
        bind = %config.bind_addr(),
        read_timeout = ?config.read_timeout,
        "starting echo server"
    );

    let shutdown = ShutdownCoordinator::new();
    let (addr, accept) = server.listen(shutdown.token()).await?;
    info!(%addr, "echo server ready, ctrl-c to stop");

    wait_for_ctrl_c().await?;
    let _ = shutdown.graceful_shutdown(vec![accept], None).await;
    info!(metrics = %metrics.render(), "final metrics");
    Ok(())
}

async fn broadcast_demo(
    settings: &Settings,
    host: Option<String>,
    port: Option<u16>,
    clients: Option<usize>,
) -> Result<()> {
    let metrics = tinyws_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;
    let demo = &settings.demo;
    let broadcaster = Arc::new(Broadcaster::new());
    let stats = Arc::new(DemoStats::new());

    let mut server = WsServer::new(server_config(settings, host, port));
    let _ = server
        .route(
            demo.broadcast_path.as_str(),
            Arc::new(Subscribe::new(Arc::clone(&broadcaster))),
        )?
        .observer(Arc::new(
            ObserverChain::new()
                .with(Arc::new(TracingObserver))
                .with(stats.clone())
                .with(broadcaster.clone()),
        ))?;

    let shutdown = ShutdownCoordinator::new();
    let (addr, accept) = server.listen(shutdown.token()).await?;
    let url = format!("ws://{addr}{}", demo.broadcast_path);

    let ticker = Ticker::new(Arc::clone(&broadcaster))
        .with_settings(demo)
        .with_stats(Arc::clone(&stats))
        .spawn(shutdown.token());
    let fleet = fleet::spawn(
        fleet::FleetConfig {
            url: url.clone(),
            origin: demo.client_origin.clone(),
            clients: clients.unwrap_or(demo.clients),
            stop_word: demo.stop_word.clone(),
        },
        Arc::clone(&stats),
        shutdown.token(),
    );

    info!(%url, "broadcast demo running: updates every {} ms, stats every {} ms, ctrl-c to stop",
        demo.broadcast_interval_ms, demo.stats_interval_ms);

    wait_for_ctrl_c().await?;
    let _ = shutdown
        .graceful_shutdown(vec![accept, ticker, fleet], Some(Duration::from_secs(10)))
        .await;
    info!(final_stats = %stats.snapshot(), "broadcast demo stopped");
    info!(metrics = %metrics.render(), "final metrics");
    Ok(())
}

async fn probe(settings: &Settings, url: &str, message: &str, replies: usize) -> Result<()> {
    let mut client = WsClient::connect(url, Some(&settings.demo.client_origin))
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    client.set_read_timeout(Some(Duration::from_millis(settings.server.read_timeout_ms)));
    client.send_text(message).await?;

    let mut received = 0;
    let _ = client
        .receive_until(&settings.demo.stop_word, |reply| {
            println!("{reply}");
            received += 1;
            received < replies
        })
        .await?;
    client.close().await?;
    Ok(())
}

async fn wait_for_ctrl_c() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["tinyws", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Serve {
                port: Some(9000),
                ..
            }
        ));

        let cli = Cli::try_parse_from(["tinyws", "broadcast-demo", "--clients", "10"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::BroadcastDemo {
                clients: Some(10),
                ..
            }
        ));

        let cli = Cli::try_parse_from(["tinyws", "probe"]).unwrap();
        match cli.command {
            Command::Probe {
                url,
                message,
                replies,
            } => {
                assert_eq!(url, "ws://127.0.0.1:8081/echo");
                assert_eq!(message, "Hello WebSocket");
                assert_eq!(replies, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_override_settings() {
        let settings = Settings::default();
        let config = server_config(&settings, Some("0.0.0.0".into()), Some(0));
        assert_eq!(config.bind_addr(), "0.0.0.0:0");
        let config = server_config(&settings, None, None);
        assert_eq!(config.bind_addr(), "127.0.0.1:8081");
    }

    #[test]
    fn clap_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
