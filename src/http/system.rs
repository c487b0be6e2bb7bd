use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::dto::OverlapView;
use super::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub rooms: usize,
    pub bookings: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.engine.stats();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        rooms: stats.rooms,
        bookings: stats.reservations,
    })
}

/// GET /audit/overlaps: double bookings that should never exist. Empty when healthy.
pub async fn overlaps(State(state): State<AppState>) -> Json<Vec<OverlapView>> {
    let reports = state.engine.audit_overlaps().await;
    Json(reports.iter().map(OverlapView::from).collect())
}
