use crate::{client_state::ConnectionStatus, error::DashboardError};
use anyhow::Result;
use metrics::{Counter, Gauge, counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::LazyLock};
use tracing::{error, info};

// Global metrics
pub static FRAMES_RECEIVED_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("fvg_frames_received_total"));
pub static FVG_EVENTS_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("fvg_events_total"));
pub static MALFORMED_FRAMES_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("fvg_malformed_frames_total"));
pub static RECONNECT_COUNTER: LazyLock<Counter> =
    LazyLock::new(|| counter!("fvg_reconnects_total"));
pub static ALERTS_COUNTER: LazyLock<Counter> = LazyLock::new(|| counter!("fvg_alerts_total"));
pub static CONNECTED_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("fvg_connected"));
pub static LOG_SIZE_GAUGE: LazyLock<Gauge> = LazyLock::new(|| gauge!("fvg_event_log_size"));

pub async fn setup_metrics(port: u16) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", "fvg-dashboard")
        .add_global_label("version", env!("CARGO_PKG_VERSION"));

    match builder.install() {
        Ok(_) => {
            info!(
                "Prometheus metrics server started on http://{}/metrics",
                addr
            );

            FRAMES_RECEIVED_COUNTER.absolute(0);
            FVG_EVENTS_COUNTER.absolute(0);
            MALFORMED_FRAMES_COUNTER.absolute(0);
            RECONNECT_COUNTER.absolute(0);
            ALERTS_COUNTER.absolute(0);
            CONNECTED_GAUGE.set(0.0);
            LOG_SIZE_GAUGE.set(0.0);

            Ok(())
        }
        Err(e) => {
            error!("Failed to start metrics server: {}", e);
            Err(DashboardError::MetricsError(e.to_string()).into())
        }
    }
}

impl ConnectionStatus {
    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": if self.is_healthy() { "healthy" } else { "unhealthy" },
            "connection_id": self.connection_id,
            "phase": self.phase,
            "connected": self.connected,
            "reconnect_attempts": self.reconnect_attempts,
            "max_attempts": self.max_attempts,
            "reconnect_delay_ms": self.reconnect_delay_ms,
            "scanning": self.scanning,
            "total_messages": self.total_messages_received,
            "malformed_frames": self.malformed_frames,
            "timestamp": chrono::Utc::now()
        })
    }
}
