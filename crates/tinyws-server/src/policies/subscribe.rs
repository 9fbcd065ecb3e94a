//! Registers senders with a shared broadcaster.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::DispatchError;
use crate::hooks::{MessagePolicy, SessionInfo};
use crate::websocket::{Broadcaster, SenderHandle};

/// Any text message subscribes the sending session to `broadcaster`.
#[derive(Clone)]
pub struct Subscribe {
    broadcaster: Arc<Broadcaster>,
}

impl Subscribe {
    /// Subscribe senders to `broadcaster`.
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl MessagePolicy for Subscribe {
    async fn on_message(
        &self,
        session: &SessionInfo,
        sender: &SenderHandle,
        payload: &str,
    ) -> Result<(), DispatchError> {
        if self.broadcaster.register(sender) {
            debug!(session_id = %session.id, greeting = payload, "subscribed");
        }
        Ok(())
    }
}
