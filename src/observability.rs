use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "innkeep_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "innkeep_http_request_duration_seconds";

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: committed booking actions. Labels: action.
pub const BOOKING_ACTIONS_TOTAL: &str = "innkeep_booking_actions_total";

/// Counter: admissions refused because the room was already booked.
pub const ADMISSION_CONFLICTS_TOTAL: &str = "innkeep_admission_conflicts_total";

/// Counter: pending bookings cancelled by the reaper.
pub const PENDING_EXPIRED_TOTAL: &str = "innkeep_pending_expired_total";

/// Counter: overlapping stays found by the auditor. Should stay at zero.
pub const OVERLAPS_DETECTED_TOTAL: &str = "innkeep_overlaps_detected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
