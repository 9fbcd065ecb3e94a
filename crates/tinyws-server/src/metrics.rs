//! Metric names and the Prometheus recorder.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before any metric is recorded. The handle renders
/// the text exposition format.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// TCP connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Sessions ended after a successful handshake (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open sessions (gauge).
pub const WS_SESSIONS_ACTIVE: &str = "ws_sessions_active";
/// Connections closed without an upgrade (counter).
pub const WS_HANDSHAKE_FAILURES_TOTAL: &str = "ws_handshake_failures_total";
/// Frames decoded from peers (counter, label: opcode).
pub const WS_FRAMES_RECEIVED_TOTAL: &str = "ws_frames_received_total";
/// Frames written to peers (counter).
pub const WS_FRAMES_SENT_TOTAL: &str = "ws_frames_sent_total";
/// Sessions ended by the idle timeout (counter).
pub const WS_IDLE_TIMEOUTS_TOTAL: &str = "ws_idle_timeouts_total";
/// Policy errors (counter).
pub const WS_DISPATCH_ERRORS_TOTAL: &str = "ws_dispatch_errors_total";
/// Broadcast rounds started (counter).
pub const WS_BROADCAST_ROUNDS_TOTAL: &str = "ws_broadcast_rounds_total";
/// Failed broadcast deliveries (counter).
pub const WS_BROADCAST_FAILURES_TOTAL: &str = "ws_broadcast_failures_total";
/// Registered broadcast recipients (gauge).
pub const WS_BROADCAST_RECIPIENTS: &str = "ws_broadcast_recipients";
