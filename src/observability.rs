use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Booking flow ────────────────────────────────────────────────

/// Counter: bookings committed. Labels: kind (`single` | `recurring_instance`), status.
pub const BOOKINGS_CREATED_TOTAL: &str = "amenity_bookings_created_total";

/// Counter: booking requests rejected. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "amenity_bookings_rejected_total";

/// Counter: status changes. Labels: status.
pub const BOOKING_STATUS_CHANGES_TOTAL: &str = "amenity_booking_status_changes_total";

/// Counter: recurring occurrences skipped. Labels: reason.
pub const RECURRING_SKIPPED_TOTAL: &str = "amenity_recurring_skipped_total";

/// Counter: day documents created lazily.
pub const DAYS_OPENED_TOTAL: &str = "amenity_days_opened_total";

// ── Durable log ─────────────────────────────────────────────────

/// Histogram: group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "amenity_wal_flush_duration_seconds";

/// Histogram: records per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "amenity_wal_flush_batch_size";

/// Counter: completed compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "amenity_wal_compactions_total";

/// Gauge: communities with a loaded engine.
pub const COMMUNITIES_ACTIVE: &str = "amenity_communities_active";

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info` filter.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
