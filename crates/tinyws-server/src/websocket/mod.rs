//! Sessions, send handles, and broadcasting.

pub mod broadcast;
pub mod sender;
pub mod session;

pub use broadcast::{BroadcastRound, BroadcastStats, Broadcaster, RoundReport};
pub use sender::{Outbound, SenderHandle, SessionId};
pub use session::SessionState;
