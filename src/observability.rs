use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "slotbook_bookings_created_total";

/// Counter: booking creations rejected by the conflict checker.
pub const BOOKING_CONFLICTS_TOTAL: &str = "slotbook_booking_conflicts_total";

/// Counter: successful status transitions. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "slotbook_transitions_total";

/// Counter: transitions rejected as unreachable from the current status.
pub const INVALID_TRANSITIONS_TOTAL: &str = "slotbook_invalid_transitions_total";

/// Counter: booking events handed to the notification dispatcher.
pub const NOTIFICATIONS_TOTAL: &str = "slotbook_notifications_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: snapshot group-commit flush duration in seconds.
pub const SNAPSHOT_FLUSH_DURATION_SECONDS: &str = "slotbook_snapshot_flush_duration_seconds";

/// Histogram: snapshot group-commit batch size (records per flush).
pub const SNAPSHOT_FLUSH_BATCH_SIZE: &str = "slotbook_snapshot_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
