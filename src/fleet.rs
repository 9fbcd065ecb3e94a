//! Reconnecting client fleet for the broadcast demo.

use std::sync::Arc;
use std::time::Duration;

use tinyws_client::{ClientError, WsClient};
use tinyws_server::policies::DemoStats;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where the fleet connects and how it behaves.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Subscription URL.
    pub url: String,
    /// `Origin` header.
    pub origin: String,
    /// Number of concurrent clients.
    pub clients: usize,
    /// Message that ends a client for good.
    pub stop_word: String,
}

const RETRY_PAUSE: Duration = Duration::from_millis(250);

/// Launch every client; the returned task ends once all of them have.
pub fn spawn(
    config: FleetConfig,
    stats: Arc<DemoStats>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let config = Arc::new(config);
        let mut clients = JoinSet::new();
        for id in 0..config.clients {
            let _ = clients.spawn(run_client(
                id,
                Arc::clone(&config),
                Arc::clone(&stats),
                token.clone(),
            ));
        }
        info!(clients = config.clients, url = %config.url, "client fleet launched");
        while clients.join_next().await.is_some() {}
        debug!("client fleet finished");
    })
}

async fn run_client(
    id: usize,
    config: Arc<FleetConfig>,
    stats: Arc<DemoStats>,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        match session(id, &config, &stats, &token).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(error) => {
                stats.record_client_error();
                debug!(client = id, %error, "client session failed");
                tokio::time::sleep(RETRY_PAUSE).await;
            }
        }
        if token.is_cancelled() {
            break;
        }
        stats.record_reconnect();
    }
}

/// One connect-subscribe-listen cycle. `Ok(true)` means stop for good.
async fn session(
    id: usize,
    config: &FleetConfig,
    stats: &DemoStats,
    token: &CancellationToken,
) -> Result<bool, ClientError> {
    let mut client = WsClient::connect(&config.url, Some(&config.origin)).await?;
    client.send_text(&format!("Client {id} connecting")).await?;

    let stop = tokio::select! {
        () = token.cancelled() => true,
        received = client.receive_until(&config.stop_word, |_| {
            stats.record_message(id);
            true
        }) => received?,
    };
    client.close().await?;
    Ok(stop)
}
