//! Demo message policies.

pub mod echo;
pub mod stats;
pub mod subscribe;
pub mod ticker;

pub use echo::EchoWithDelay;
pub use stats::{DemoStats, StatsSnapshot};
pub use subscribe::Subscribe;
pub use ticker::Ticker;
