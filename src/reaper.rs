use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{Engine, now_ms};
use crate::model::Ms;
use crate::observability::{OVERLAPS_DETECTED_TOTAL, PENDING_EXPIRED_TOTAL};

/// Cancel every pending booking whose check-in is more than `grace` in the past.
/// Returns how many were expired.
pub async fn expire_stale_pending(engine: &Engine, now: Ms, grace: Ms) -> usize {
    let mut expired = 0;
    for id in engine.collect_stale_pending(now, grace) {
        match engine.expire_pending(id, now, grace).await {
            Ok(_) => {
                info!(booking = %id, "expired unconfirmed booking");
                metrics::counter!(PENDING_EXPIRED_TOTAL).increment(1);
                expired += 1;
            }
            // Confirmed, cancelled or rescheduled since collection
            Err(e) => tracing::debug!("reaper skip {id}: {e}"),
        }
    }
    expired
}

/// Background task that expires unconfirmed bookings. A zero grace disables it.
pub async fn run_pending_reaper(engine: Arc<Engine>, grace: Duration) {
    if grace.is_zero() {
        return;
    }
    let grace_ms = Ms::try_from(grace.as_millis()).unwrap_or(Ms::MAX);
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        expire_stale_pending(&engine, now_ms(), grace_ms).await;
    }
}

/// Compact the WAL if enough appends accumulated. Returns whether it ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    if engine.wal_appends_since_compact().await < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}

pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

/// Scan for overlapping stays and report each one. Returns the count found.
pub async fn audit_once(engine: &Engine) -> usize {
    let reports = engine.audit_overlaps().await;
    for r in &reports {
        tracing::error!(
            room = %r.room_id,
            first = %r.first,
            second = %r.second,
            "double booking detected over [{}, {})",
            r.overlap.start,
            r.overlap.end
        );
    }
    metrics::counter!(OVERLAPS_DETECTED_TOTAL).increment(reports.len() as u64);
    reports.len()
}

/// Background overlap auditor. A zero period disables it.
pub async fn run_auditor(engine: Arc<Engine>, every: Duration) {
    if every.is_zero() {
        return;
    }
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        audit_once(&engine).await;
    }
}
