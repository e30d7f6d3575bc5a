// src/handlers/allocation.rs

use crate::{
    errors::{AppError, AppResult},
    models::{Allocation, AllocationSummary, ComputeAllocationRequest},
    services::allocator,
    state::AppState,
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use utoipa::IntoParams;

/// Split a branch's published targets across its eligible staff for a period
#[utoipa::path(
    post,
    path = "/api/v1/allocations/compute",
    request_body = ComputeAllocationRequest,
    responses(
        (status = 200, description = "Allocations regenerated", body = AllocationSummary),
        (status = 422, description = "No published targets or no eligible staff"),
    ),
    tag = "Allocations"
)]
pub async fn compute_allocation(
    State(state): State<AppState>,
    Json(body): Json<ComputeAllocationRequest>,
) -> AppResult<Json<AllocationSummary>> {
    if body.period.trim().is_empty() || body.branch.trim().is_empty() {
        return Err(AppError::Validation(
            "period and branch are required".to_string(),
        ));
    }

    let summary = allocator::compute_allocation(&state.db, &body.period, &body.branch).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AllocationListQuery {
    /// Format: "YYYY-MM"
    pub period: String,
    pub branch: String,
}

/// Read back the generated allocation set for a branch and period
#[utoipa::path(
    get,
    path = "/api/v1/allocations",
    params(AllocationListQuery),
    responses((status = 200, description = "Current allocation set", body = Vec<Allocation>)),
    tag = "Allocations"
)]
pub async fn list_allocations(
    State(state): State<AppState>,
    Query(query): Query<AllocationListQuery>,
) -> AppResult<Json<Vec<Allocation>>> {
    let allocations = sqlx::query_as::<_, Allocation>(
        r#"SELECT * FROM allocations
           WHERE period = $1 AND branch_code = $2
           ORDER BY kpi_code, created_at"#,
    )
    .bind(&query.period)
    .bind(&query.branch)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(allocations))
}
