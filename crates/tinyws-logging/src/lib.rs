//! # tinyws-logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` always wins over the
//! configured level; otherwise the filter is built from [`LoggingConfig`].

#![deny(unsafe_code)]

use std::str::FromStr;

use tinyws_settings::LoggingSettings;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Subscriber configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    pub level: Level,
    /// Per-target overrides, e.g. `("tinyws_core", DEBUG)`.
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Add a per-target level override.
    #[must_use]
    pub fn with_module_level(mut self, module: impl Into<String>, level: Level) -> Self {
        self.module_levels.push((module.into(), level));
        self
    }

    /// Filter directives for [`EnvFilter`], e.g. `info,tinyws_core=debug`.
    pub fn directives(&self) -> String {
        let mut out = self.level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            out.push(',');
            out.push_str(module);
            out.push('=');
            out.push_str(&level.to_string().to_lowercase());
        }
        out
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    /// An unrecognised level name falls back to `info`.
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: Level::from_str(settings.level.trim()).unwrap_or(Level::INFO),
            module_levels: Vec::new(),
            json: settings.json,
        }
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Returns `false` if a subscriber was already installed (common in tests).
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_ok()
}

/// Install a test-friendly subscriber that writes through the test harness.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
