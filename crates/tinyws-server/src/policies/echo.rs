//! Replies to each message with numbered copies of it.

use std::time::Duration;

use async_trait::async_trait;
use tinyws_settings::DemoSettings;
use tracing::trace;

use crate::error::DispatchError;
use crate::hooks::{MessagePolicy, SessionInfo};
use crate::websocket::SenderHandle;

/// On text `M`, send `M-1` .. `M-n`, pausing after each.
///
/// The pause runs on the session's own task, so it holds back only that
/// session's next read.
#[derive(Debug, Clone)]
pub struct EchoWithDelay {
    repeats: u32,
    delay: Duration,
}

impl EchoWithDelay {
    /// Echo `repeats` times with `delay` between replies.
    pub fn new(repeats: u32, delay: Duration) -> Self {
        Self { repeats, delay }
    }
}

impl Default for EchoWithDelay {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

impl From<&DemoSettings> for EchoWithDelay {
    fn from(settings: &DemoSettings) -> Self {
        Self::new(
            settings.echo_repeats,
            Duration::from_millis(settings.echo_delay_ms),
        )
    }
}

#[async_trait]
impl MessagePolicy for EchoWithDelay {
    async fn on_message(
        &self,
        session: &SessionInfo,
        sender: &SenderHandle,
        payload: &str,
    ) -> Result<(), DispatchError> {
        for i in 1..=self.repeats {
            trace!(session_id = %session.id, i, "echo");
            sender.send_text(format!("{payload}-{i}")).await?;
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::SessionId;

    fn info() -> SessionInfo {
        SessionInfo {
            id: SessionId::next(),
            peer: "127.0.0.1:1".parse().unwrap(),
            path: "/echo".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn replies_in_order_with_spacing() {
        let (sender, mut rx) = SenderHandle::channel(8);
        let writer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(out) = rx.recv().await {
                seen.push((out.frame.text_lossy(), tokio::time::Instant::now()));
                out.complete(Ok(()));
            }
            seen
        });

        let policy = EchoWithDelay::default();
        policy.on_message(&info(), &sender, "ping").await.unwrap();
        drop(sender);

        let seen = writer.await.unwrap();
        let texts: Vec<&str> = seen.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, ["ping-1", "ping-2", "ping-3"]);
        for pair in seen.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(gap >= Duration::from_millis(100) && gap < Duration::from_millis(110));
        }
    }

    #[tokio::test]
    async fn closed_sender_is_a_dispatch_error() {
        let (sender, rx) = SenderHandle::channel(1);
        drop(rx);
        let err = EchoWithDelay::new(2, Duration::ZERO)
            .on_message(&info(), &sender, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Send(_)));
    }

    #[test]
    fn built_from_settings() {
        let settings = DemoSettings {
            echo_repeats: 5,
            echo_delay_ms: 20,
            ..DemoSettings::default()
        };
        let policy = EchoWithDelay::from(&settings);
        assert_eq!(policy.repeats, 5);
        assert_eq!(policy.delay, Duration::from_millis(20));
    }
}
