// src/handlers/transfer.rs

use crate::{
    errors::AppResult,
    models::{ExecuteTransferRequest, TransferOutcome},
    services::transfer,
    state::AppState,
};
use axum::{Json, extract::State, http::StatusCode};

/// Execute a mid-period branch transfer: the old branch's allocations are
/// regenerated without the departing staff member and the period targets are
/// prorated across both branches within the financial year.
#[utoipa::path(
    post,
    path = "/api/v1/transfers",
    request_body = ExecuteTransferRequest,
    responses(
        (status = 201, description = "Transfer committed", body = TransferOutcome),
        (status = 400, description = "Invalid period or identical branches"),
    ),
    tag = "Transfers"
)]
pub async fn execute_transfer(
    State(state): State<AppState>,
    Json(body): Json<ExecuteTransferRequest>,
) -> AppResult<(StatusCode, Json<TransferOutcome>)> {
    let outcome = transfer::execute_transfer(&state.db, &body).await?;
    Ok((StatusCode::CREATED, Json(outcome.rounded())))
}
