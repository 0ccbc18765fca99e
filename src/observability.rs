use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings accepted into `Pending`.
pub const BOOKINGS_TOTAL: &str = "roomledger_bookings_total";

/// Counter: booking requests rejected by the availability check.
pub const BOOKING_CONFLICTS_TOTAL: &str = "roomledger_booking_conflicts_total";

/// Counter: bookings confirmed via payment completion.
pub const CONFIRMATIONS_TOTAL: &str = "roomledger_confirmations_total";

/// Counter: bookings cancelled (owner, staff or reaper).
pub const CANCELLATIONS_TOTAL: &str = "roomledger_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently in the engine.
pub const ROOMS_ACTIVE: &str = "roomledger_rooms_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomledger_wal_flush_batch_size";

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
