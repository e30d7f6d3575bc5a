// src/services/rollup.rs
//
// Composes per-entity scores upward through the management hierarchy:
// clerk/attender from their allocations, BMs from branch targets, HO staff
// from the role-KPI catalog, AGMs/DGMs from their subordinates, and the GM
// from the AGM/DGM totals.

use crate::{
    errors::{AppError, AppResult},
    models::{KpiScoreDetail, RoleKpiMapping, RollupCategory, ScoreReport, StaffRole, Weightage},
    services::scoring::{self, KpiInput, KPI_INSURANCE, MAX_SCORE},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

// ─── Keyword dispatch ─────────────────────────────────────────────────────────

/// Keyword rules for supervisor-level KPI names, in declaration order.
/// Classification scans every rule and keeps the LAST match, so a name like
/// "branch audit" resolves to the manual lookup, not the branch average.
const KEYWORD_RULES: &[(&str, RollupCategory)] = &[
    ("section", RollupCategory::SectionAverage),
    ("branch", RollupCategory::BranchAverage),
    ("visits", RollupCategory::BranchAverage),
    ("clean", RollupCategory::ManualLookup),
    ("management", RollupCategory::ManualLookup),
    ("audit", RollupCategory::ManualLookup),
    ("it", RollupCategory::ManualLookup),
    ("business development", RollupCategory::ManualLookup),
    ("insurance", RollupCategory::InsuranceDirect),
];

fn rule_matches(name: &str, keyword: &str) -> bool {
    // "it" must match as a word: a substring check would swallow every
    // "visits"/"audit" name and make those rules unreachable
    if keyword == "it" {
        name.split_whitespace().any(|w| w == "it")
    } else {
        name.contains(keyword)
    }
}

pub(crate) fn classify_kpi_name(name: &str) -> Option<RollupCategory> {
    let lower = name.to_lowercase();
    let mut category = None;
    for (keyword, cat) in KEYWORD_RULES {
        if rule_matches(&lower, keyword) {
            category = Some(*cat);
        }
    }
    category
}

// ─── Shared fetch helpers ─────────────────────────────────────────────────────

async fn weightage_map(db: &PgPool) -> AppResult<HashMap<String, Decimal>> {
    let rows = sqlx::query_as::<_, Weightage>("SELECT * FROM weightages")
        .fetch_all(db)
        .await?;
    Ok(rows.into_iter().map(|w| (w.kpi_code, w.percentage)).collect())
}

fn weightage_for(map: &HashMap<String, Decimal>, kpi: &str) -> AppResult<Decimal> {
    map.get(kpi)
        .copied()
        .ok_or_else(|| AppError::WeightageMissing(kpi.to_string()))
}

async fn verified_staff_sum(
    db: &PgPool,
    period: &str,
    staff_id: Uuid,
    kpi: &str,
) -> AppResult<Decimal> {
    let sum = sqlx::query_scalar::<_, Decimal>(
        r#"SELECT COALESCE(SUM(value), 0) FROM entries
           WHERE period = $1 AND staff_id = $2 AND kpi_code = $3 AND status = 'verified'"#,
    )
    .bind(period)
    .bind(staff_id)
    .bind(kpi)
    .fetch_one(db)
    .await?;
    Ok(sum)
}

async fn verified_branch_sum(
    db: &PgPool,
    period: &str,
    branch: &str,
    kpi: &str,
) -> AppResult<Decimal> {
    let sum = sqlx::query_scalar::<_, Decimal>(
        r#"SELECT COALESCE(SUM(value), 0) FROM entries
           WHERE period = $1 AND branch_code = $2 AND kpi_code = $3 AND status = 'verified'"#,
    )
    .bind(period)
    .bind(branch)
    .bind(kpi)
    .fetch_one(db)
    .await?;
    Ok(sum)
}

async fn role_mappings(db: &PgPool, role: StaffRole) -> AppResult<Vec<RoleKpiMapping>> {
    let mappings = sqlx::query_as::<_, RoleKpiMapping>(
        "SELECT * FROM role_kpi_mappings WHERE role = $1 ORDER BY created_at, kpi_name",
    )
    .bind(role)
    .fetch_all(db)
    .await?;
    Ok(mappings)
}

async fn manual_value(
    db: &PgPool,
    staff_id: Uuid,
    mapping_id: Uuid,
    period: &str,
) -> AppResult<Decimal> {
    let value = sqlx::query_scalar::<_, Decimal>(
        "SELECT value FROM manual_entries WHERE staff_id = $1 AND mapping_id = $2 AND period = $3",
    )
    .bind(staff_id)
    .bind(mapping_id)
    .bind(period)
    .fetch_optional(db)
    .await?;
    Ok(value.unwrap_or(Decimal::ZERO))
}

fn average(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        Decimal::ZERO
    } else {
        values.iter().copied().sum::<Decimal>() / Decimal::from(values.len() as i64)
    }
}

// ─── Staff (clerk/attender) ───────────────────────────────────────────────────

/// Score an allocated staff member from their allocations and own verified
/// entries. Simple growth mode, no adaptive cap.
pub async fn staff_score(db: &PgPool, period: &str, staff_id: Uuid) -> AppResult<ScoreReport> {
    let allocations = sqlx::query_as::<_, (String, i64)>(
        r#"SELECT kpi_code, amount FROM allocations
           WHERE period = $1 AND staff_id = $2 AND published
           ORDER BY kpi_code"#,
    )
    .bind(period)
    .bind(staff_id)
    .fetch_all(db)
    .await?;

    if allocations.is_empty() {
        return Err(AppError::NotFound(format!(
            "No allocations for staff {staff_id} in period {period}"
        )));
    }

    let weightages = weightage_map(db).await?;
    let mut inputs = Vec::with_capacity(allocations.len());
    for (kpi, amount) in &allocations {
        let achieved = verified_staff_sum(db, period, staff_id, kpi).await?;
        inputs.push(KpiInput {
            kpi: kpi.clone(),
            achieved,
            target: Decimal::from(*amount),
            weightage: weightage_for(&weightages, kpi)?,
        });
    }

    let per_kpi = scoring::staff_score_set(&inputs);
    let total = scoring::total_of(&per_kpi);
    Ok(ScoreReport {
        entity_id: staff_id.to_string(),
        period: period.to_string(),
        per_kpi,
        total,
    })
}

// ─── Branch / BM ──────────────────────────────────────────────────────────────

/// Score a branch (and thereby its BM) from published branch targets and
/// branch-wide verified entries: cross-conditioned growth plus the adaptive
/// cap.
pub async fn bm_score(db: &PgPool, period: &str, branch: &str) -> AppResult<ScoreReport> {
    let targets = sqlx::query_as::<_, (String, i64)>(
        r#"SELECT kpi_code, amount FROM targets
           WHERE period = $1 AND branch_code = $2 AND published
           ORDER BY kpi_code"#,
    )
    .bind(period)
    .bind(branch)
    .fetch_all(db)
    .await?;

    if targets.is_empty() {
        return Err(AppError::NoTargetsFound {
            branch: branch.to_string(),
            period: period.to_string(),
        });
    }

    let weightages = weightage_map(db).await?;
    let mut inputs = Vec::with_capacity(targets.len());
    for (kpi, amount) in &targets {
        let achieved = verified_branch_sum(db, period, branch, kpi).await?;
        inputs.push(KpiInput {
            kpi: kpi.clone(),
            achieved,
            target: Decimal::from(*amount),
            weightage: weightage_for(&weightages, kpi)?,
        });
    }

    let per_kpi = scoring::branch_score_set(&inputs);
    let total = scoring::total_of(&per_kpi);
    Ok(ScoreReport {
        entity_id: branch.to_string(),
        period: period.to_string(),
        per_kpi,
        total,
    })
}

// ─── HO staff ─────────────────────────────────────────────────────────────────

/// Score a head-office staff member from the role-KPI catalog and the
/// manual-entry table. Each mapped KPI is scored against its own weightage
/// value as target.
pub async fn hostaff_score(
    db: &PgPool,
    period: &str,
    staff_id: Uuid,
    role: StaffRole,
) -> AppResult<ScoreReport> {
    let mappings = role_mappings(db, role).await?;
    if mappings.is_empty() {
        return Err(AppError::NotFound(format!(
            "No KPI mappings configured for role {role:?}"
        )));
    }

    let mut per_kpi = Vec::with_capacity(mappings.len());
    for mapping in &mappings {
        let achieved = manual_value(db, staff_id, mapping.id, period).await?;
        per_kpi.push(scoring::mapped_kpi_detail(
            &mapping.kpi_name,
            mapping.weightage,
            achieved,
        ));
    }

    let total = scoring::total_of(&per_kpi);
    Ok(ScoreReport {
        entity_id: staff_id.to_string(),
        period: period.to_string(),
        per_kpi,
        total,
    })
}

// ─── AGM / DGM ────────────────────────────────────────────────────────────────

async fn subordinates(
    db: &PgPool,
    supervisor: Uuid,
    role: StaffRole,
) -> AppResult<Vec<(Uuid, String)>> {
    let rows = sqlx::query_as::<_, (Uuid, String)>(
        r#"SELECT id, branch_code FROM staff_members
           WHERE hod = $1 AND role = $2 AND is_active
           ORDER BY created_at, id"#,
    )
    .bind(supervisor)
    .bind(role)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Average of subordinate HO-staff totals, paired by staff id
async fn section_average(db: &PgPool, period: &str, supervisor: Uuid) -> AppResult<Decimal> {
    let mut totals: Vec<(Uuid, Decimal)> = Vec::new();
    for (staff_id, _) in subordinates(db, supervisor, StaffRole::HoStaff).await? {
        let report = hostaff_score(db, period, staff_id, StaffRole::HoStaff).await;
        match report {
            Ok(r) => totals.push((staff_id, r.total)),
            Err(AppError::NotFound(_)) => totals.push((staff_id, Decimal::ZERO)),
            Err(e) => return Err(e),
        }
    }
    let values: Vec<Decimal> = totals.iter().map(|(_, t)| *t).collect();
    Ok(average(&values))
}

/// Average of subordinate BM totals, paired by branch code
async fn branch_average(db: &PgPool, period: &str, supervisor: Uuid) -> AppResult<Decimal> {
    let mut totals: Vec<(String, Decimal)> = Vec::new();
    for (_, branch) in subordinates(db, supervisor, StaffRole::Bm).await? {
        let report = bm_score(db, period, &branch).await;
        match report {
            Ok(r) => totals.push((branch, r.total)),
            Err(AppError::NoTargetsFound { .. }) => totals.push((branch, Decimal::ZERO)),
            Err(e) => return Err(e),
        }
    }
    let values: Vec<Decimal> = totals.iter().map(|(_, t)| *t).collect();
    Ok(average(&values))
}

fn averaged_detail(mapping: &RoleKpiMapping, value: Decimal) -> KpiScoreDetail {
    let score = value.clamp(Decimal::ZERO, MAX_SCORE);
    KpiScoreDetail {
        kpi: mapping.kpi_name.clone(),
        score,
        target: MAX_SCORE,
        achieved: value,
        weightage: mapping.weightage,
        weightage_score: score * mapping.weightage / dec!(100),
    }
}

fn manual_lookup_detail(mapping: &RoleKpiMapping, achieved: Decimal) -> KpiScoreDetail {
    // this call path grants the full 12.5 from ratio 1 upward
    let score = scoring::two_tier(scoring::ratio(achieved, mapping.weightage))
        .clamp(Decimal::ZERO, MAX_SCORE);
    KpiScoreDetail {
        kpi: mapping.kpi_name.clone(),
        score,
        target: mapping.weightage,
        achieved,
        weightage: mapping.weightage,
        weightage_score: score * mapping.weightage / dec!(100),
    }
}

/// Score an AGM/DGM. Nothing is computed from their own targets: every
/// mapped KPI resolves through its roll-up category: subordinate averages,
/// manual lookups, or direct insurance entries against the fixed target.
pub async fn agm_score(
    db: &PgPool,
    period: &str,
    staff_id: Uuid,
    role: StaffRole,
) -> AppResult<ScoreReport> {
    let mappings = role_mappings(db, role).await?;
    if mappings.is_empty() {
        return Err(AppError::NotFound(format!(
            "No KPI mappings configured for role {role:?}"
        )));
    }

    let mut per_kpi = Vec::with_capacity(mappings.len());
    for mapping in &mappings {
        let category = mapping
            .category
            .or_else(|| classify_kpi_name(&mapping.kpi_name));
        let row = match category {
            Some(RollupCategory::SectionAverage) => {
                averaged_detail(mapping, section_average(db, period, staff_id).await?)
            }
            Some(RollupCategory::BranchAverage) => {
                averaged_detail(mapping, branch_average(db, period, staff_id).await?)
            }
            Some(RollupCategory::ManualLookup) => {
                let achieved = manual_value(db, staff_id, mapping.id, period).await?;
                manual_lookup_detail(mapping, achieved)
            }
            Some(RollupCategory::InsuranceDirect) => {
                let achieved = verified_staff_sum(db, period, staff_id, KPI_INSURANCE).await?;
                let mut row =
                    scoring::mapped_kpi_detail(KPI_INSURANCE, mapping.weightage, achieved);
                row.kpi = mapping.kpi_name.clone();
                row
            }
            // unmapped names contribute nothing
            None => KpiScoreDetail {
                kpi: mapping.kpi_name.clone(),
                score: Decimal::ZERO,
                target: mapping.weightage,
                achieved: Decimal::ZERO,
                weightage: mapping.weightage,
                weightage_score: Decimal::ZERO,
            },
        };
        per_kpi.push(row);
    }

    let total = scoring::total_of(&per_kpi);
    Ok(ScoreReport {
        entity_id: staff_id.to_string(),
        period: period.to_string(),
        per_kpi,
        total,
    })
}

// ─── GM ───────────────────────────────────────────────────────────────────────

/// Equal-share weighted rows for the GM roll-up: every AGM/DGM total gets a
/// 100/N weight
pub(crate) fn equal_share_rows(totals: &[(String, Decimal)]) -> Vec<KpiScoreDetail> {
    if totals.is_empty() {
        return Vec::new();
    }
    let share = dec!(100) / Decimal::from(totals.len() as i64);
    totals
        .iter()
        .map(|(name, total)| KpiScoreDetail {
            kpi: name.clone(),
            score: *total,
            target: MAX_SCORE,
            achieved: *total,
            weightage: share,
            weightage_score: *total * share / dec!(100),
        })
        .collect()
}

/// Score the GM as the equal-share weighted average of every AGM/DGM total
pub async fn gm_score(db: &PgPool, period: &str, gm_id: Uuid) -> AppResult<ScoreReport> {
    let supervisors = sqlx::query_as::<_, (Uuid, String, StaffRole)>(
        r#"SELECT id, name, role FROM staff_members
           WHERE role IN ('agm', 'dgm') AND is_active
           ORDER BY created_at, id"#,
    )
    .fetch_all(db)
    .await?;

    if supervisors.is_empty() {
        return Err(AppError::NotFound(
            "No AGM/DGM staff to roll up".to_string(),
        ));
    }

    let mut totals: Vec<(String, Decimal)> = Vec::new();
    for (id, name, role) in &supervisors {
        let report = agm_score(db, period, *id, *role).await;
        match report {
            Ok(r) => totals.push((name.clone(), r.total)),
            Err(AppError::NotFound(_)) => totals.push((name.clone(), Decimal::ZERO)),
            Err(e) => return Err(e),
        }
    }

    let per_kpi = equal_share_rows(&totals);
    let total = scoring::total_of(&per_kpi);
    Ok(ScoreReport {
        entity_id: gm_id.to_string(),
        period: period.to_string(),
        per_kpi,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_classification_takes_last_match() {
        assert_eq!(
            classify_kpi_name("Section Performance"),
            Some(RollupCategory::SectionAverage)
        );
        assert_eq!(
            classify_kpi_name("Branch Visits"),
            Some(RollupCategory::BranchAverage)
        );
        // "audit" is declared after "branch", so it wins
        assert_eq!(
            classify_kpi_name("Branch Audit Compliance"),
            Some(RollupCategory::ManualLookup)
        );
        // "insurance" is declared last and wins over "branch"
        assert_eq!(
            classify_kpi_name("Branch Insurance Business"),
            Some(RollupCategory::InsuranceDirect)
        );
        assert_eq!(classify_kpi_name("Discipline"), None);
    }

    #[test]
    fn it_keyword_matches_whole_words_only() {
        assert_eq!(
            classify_kpi_name("IT Infrastructure"),
            Some(RollupCategory::ManualLookup)
        );
        // would also match as a substring of "visits" otherwise
        assert_eq!(
            classify_kpi_name("Branch Visits"),
            Some(RollupCategory::BranchAverage)
        );
    }

    #[test]
    fn gm_total_is_equal_share_average() {
        let totals = vec![
            ("AGM North".to_string(), dec!(8.0)),
            ("AGM South".to_string(), dec!(6.0)),
        ];
        let rows = equal_share_rows(&totals);
        assert_eq!(rows[0].weightage, dec!(50));
        assert_eq!(scoring::total_of(&rows), dec!(7.0));
    }

    #[test]
    fn manual_lookup_grants_full_score_at_target() {
        let mapping = RoleKpiMapping {
            id: Uuid::new_v4(),
            role: StaffRole::Agm,
            kpi_name: "Branch Cleanliness".to_string(),
            weightage: dec!(10),
            category: Some(RollupCategory::ManualLookup),
            created_at: chrono::Utc::now(),
        };
        // ratio exactly 1 scores 12.5 on this call path
        assert_eq!(manual_lookup_detail(&mapping, dec!(10)).score, dec!(12.5));
        assert_eq!(manual_lookup_detail(&mapping, dec!(5)).score, dec!(5));
    }

    #[test]
    fn averages_clamp_into_score_bounds() {
        let mapping = RoleKpiMapping {
            id: Uuid::new_v4(),
            role: StaffRole::Agm,
            kpi_name: "Section Performance".to_string(),
            weightage: dec!(40),
            category: Some(RollupCategory::SectionAverage),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(averaged_detail(&mapping, dec!(13.4)).score, dec!(12.5));
        assert_eq!(averaged_detail(&mapping, dec!(-1)).score, Decimal::ZERO);
        assert_eq!(averaged_detail(&mapping, dec!(7.5)).weightage_score, dec!(3));
    }
}
