// src/routes/mod.rs

use crate::{
    handlers::{
        allocation::{compute_allocation, list_allocations},
        scores::compute_score,
        transfer::execute_transfer,
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // ─── Allocations ──────────────────────────────────────
        .route(
            "/allocations/compute",
            post(compute_allocation),
        )
        .route("/allocations", get(list_allocations))
        // ─── Scores ───────────────────────────────────────────
        .route("/scores/{kind}/{entity_id}", get(compute_score))
        // ─── Transfers ────────────────────────────────────────
        .route("/transfers", post(execute_transfer))
}
