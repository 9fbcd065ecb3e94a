//! Periodic broadcast and statistics report.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tinyws_settings::DemoSettings;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::stats::DemoStats;
use crate::websocket::Broadcaster;

/// Broadcasts `"Broadcast message at <unix millis>"` every `interval` and logs
/// statistics every `stats_interval`.
pub struct Ticker {
    broadcaster: Arc<Broadcaster>,
    interval: Duration,
    stats_interval: Duration,
    stats: Option<Arc<DemoStats>>,
}

impl Ticker {
    /// One-second broadcasts, ten-second reports.
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster,
            interval: Duration::from_secs(1),
            stats_interval: Duration::from_secs(10),
            stats: None,
        }
    }

    /// Timings from settings.
    #[must_use]
    pub fn with_settings(mut self, settings: &DemoSettings) -> Self {
        self.interval = Duration::from_millis(settings.broadcast_interval_ms.max(1));
        self.stats_interval = Duration::from_millis(settings.stats_interval_ms.max(1));
        self
    }

    /// Include demo counters in the report.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<DemoStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Run until `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(token).await })
    }

    async fn run(self, token: CancellationToken) {
        let mut ticks = tokio::time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reports = tokio::time::interval(self.stats_interval);
        reports.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticks.tick() => {
                    let message = broadcast_message(Utc::now().timestamp_millis());
                    let round = self.broadcaster.broadcast(message);
                    debug!(recipients = round.recipients(), "tick");
                    drop(round);
                }
                _ = reports.tick() => self.report(),
            }
        }
        debug!("ticker stopped");
    }

    fn report(&self) {
        let broadcast = self.broadcaster.stats();
        match &self.stats {
            Some(stats) => info!(
                registered = broadcast.registered,
                rounds = broadcast.rounds,
                failures = broadcast.failures,
                "{}",
                stats.snapshot()
            ),
            None => info!(
                registered = broadcast.registered,
                rounds = broadcast.rounds,
                failures = broadcast.failures,
                "broadcast stats"
            ),
        }
    }
}

/// The broadcast text for a given instant.
pub fn broadcast_message(unix_millis: i64) -> String {
    format!("Broadcast message at {unix_millis}")
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::websocket::SenderHandle;

    #[test]
    fn message_format() {
        assert_eq!(
            broadcast_message(1_700_000_000_123),
            "Broadcast message at 1700000000123"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_cancelled() {
        let broadcaster = Arc::new(Broadcaster::new());
        let (handle, mut rx) = SenderHandle::channel(8);
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        let _writer = tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                let _ = seen_tx.send(out.frame.text_lossy());
                out.complete(Ok(()));
            }
        });
        let _ = broadcaster.register(&handle);

        let token = CancellationToken::new();
        let stats = Arc::new(DemoStats::new());
        let task = Ticker::new(Arc::clone(&broadcaster))
            .with_stats(stats)
            .spawn(token.clone());

        for _ in 0..3 {
            let text = seen.recv().await.unwrap();
            assert!(text.starts_with("Broadcast message at "), "{text}");
        }
        token.cancel();
        task.await.unwrap();
        assert!(broadcaster.stats().rounds >= 3);
    }

    #[test]
    fn settings_override_intervals() {
        let settings = DemoSettings {
            broadcast_interval_ms: 250,
            stats_interval_ms: 0,
            ..DemoSettings::default()
        };
        let ticker = Ticker::new(Arc::new(Broadcaster::new())).with_settings(&settings);
        assert_eq!(ticker.interval, Duration::from_millis(250));
        assert_eq!(ticker.stats_interval, Duration::from_millis(1));
    }
}
