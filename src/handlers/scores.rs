// src/handlers/scores.rs

use crate::{
    errors::{AppError, AppResult},
    models::{ScoreReport, StaffRole},
    services::rollup,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ScoreQuery {
    /// Format: "YYYY-MM"
    pub period: String,
    /// Overrides the role whose KPI catalog is used (hostaff/agm kinds)
    pub role: Option<StaffRole>,
}

fn parse_staff_id(entity_id: &str) -> AppResult<Uuid> {
    Uuid::parse_str(entity_id)
        .map_err(|_| AppError::BadRequest(format!("'{entity_id}' is not a valid staff id")))
}

/// Compute the score breakdown for one entity of the hierarchy.
/// `kind` selects the roll-up level: staff, bm, hostaff, agm, or gm.
#[utoipa::path(
    get,
    path = "/api/v1/scores/{kind}/{entity_id}",
    params(
        ("kind" = String, Path, description = "Entity kind: staff | bm | hostaff | agm | gm"),
        ("entity_id" = String, Path, description = "Staff id (UUID) or branch code for kind=bm"),
        ScoreQuery,
    ),
    responses(
        (status = 200, description = "Per-KPI breakdown and weighted total", body = ScoreReport),
        (status = 404, description = "Entity, targets, or weightage rows missing"),
    ),
    tag = "Scores"
)]
pub async fn compute_score(
    State(state): State<AppState>,
    Path((kind, entity_id)): Path<(String, String)>,
    Query(query): Query<ScoreQuery>,
) -> AppResult<Json<ScoreReport>> {
    if query.period.trim().is_empty() {
        return Err(AppError::Validation("period is required".to_string()));
    }

    let db = &state.db;
    let report = match kind.as_str() {
        "staff" => rollup::staff_score(db, &query.period, parse_staff_id(&entity_id)?).await?,
        "bm" => rollup::bm_score(db, &query.period, &entity_id).await?,
        "hostaff" => {
            rollup::hostaff_score(
                db,
                &query.period,
                parse_staff_id(&entity_id)?,
                query.role.unwrap_or(StaffRole::HoStaff),
            )
            .await?
        }
        "agm" => {
            rollup::agm_score(
                db,
                &query.period,
                parse_staff_id(&entity_id)?,
                query.role.unwrap_or(StaffRole::Agm),
            )
            .await?
        }
        "gm" => rollup::gm_score(db, &query.period, parse_staff_id(&entity_id)?).await?,
        other => {
            return Err(AppError::BadRequest(format!(
                "Unknown score kind '{other}': expected staff, bm, hostaff, agm or gm"
            )));
        }
    };

    Ok(Json(report.rounded()))
}
