//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use inventory::ReservationState;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub products: usize,
    pub held_reservations: usize,
}

/// GET /health: liveness plus a glance at the ledger.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        products: state.ledger.product_count(),
        held_reservations: state.reservations.count_in_state(ReservationState::Held),
    })
}
