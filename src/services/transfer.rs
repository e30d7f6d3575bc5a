// src/services/transfer.rs
//
// Splits a transferring staff member's targets and achieved values across
// the old and new branch by elapsed-month fraction within the financial
// year (Apr 1 through Mar 31). The whole action runs in one transaction:
// allocation regeneration for the old branch, the old-branch snapshot
// correction, and the new-branch snapshot either all land or none do.

use crate::{
    errors::{AppError, AppResult},
    models::{ExecuteTransferRequest, StaffMember, TransferOutcome, TransferSnapshot},
    services::allocator,
};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    NoPriorTransfer,
    InsideFinancialYear,
    OutsideFinancialYear,
}

impl TransferPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferPhase::NoPriorTransfer => "no_prior_transfer",
            TransferPhase::InsideFinancialYear => "inside_financial_year",
            TransferPhase::OutsideFinancialYear => "outside_financial_year",
        }
    }
}

// ─── Financial-year arithmetic ────────────────────────────────────────────────

fn parse_period(period: &str) -> AppResult<(i32, u32)> {
    let malformed = || AppError::Validation(format!("Period must be YYYY-MM, got '{period}'"));
    let (year, month) = period.split_once('-').ok_or_else(malformed)?;
    let year: i32 = year.parse().map_err(|_| malformed())?;
    let month: u32 = month.parse().map_err(|_| malformed())?;
    if !(1..=12).contains(&month) {
        return Err(malformed());
    }
    Ok((year, month))
}

/// Apr 1 of the period's base year through Mar 31 of the following year
pub(crate) fn financial_year_window(period: &str) -> AppResult<(NaiveDate, NaiveDate)> {
    let (year, month) = parse_period(period)?;
    let base_year = if month >= 4 { year } else { year - 1 };
    let start = NaiveDate::from_ymd_opt(base_year, 4, 1)
        .ok_or_else(|| AppError::Validation(format!("Invalid period '{period}'")))?;
    let end = NaiveDate::from_ymd_opt(base_year + 1, 3, 31)
        .ok_or_else(|| AppError::Validation(format!("Invalid period '{period}'")))?;
    Ok((start, end))
}

/// Whole-month count from `from` to `to`, floored at 0. Day-of-month never
/// contributes: 2025-04-01 → 2025-08-15 is 4 months.
pub(crate) fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    let a = from.year() as i64 * 12 + from.month() as i64;
    let b = to.year() as i64 * 12 + to.month() as i64;
    (b - a).max(0)
}

pub(crate) fn prorate(amount: Decimal, months: i64) -> Decimal {
    amount * Decimal::from(months) / dec!(12)
}

pub(crate) fn determine_phase(
    prior_date: Option<NaiveDate>,
    fy_start: NaiveDate,
    fy_end: NaiveDate,
) -> TransferPhase {
    match prior_date {
        None => TransferPhase::NoPriorTransfer,
        Some(d) if d >= fy_start && d <= fy_end => TransferPhase::InsideFinancialYear,
        Some(_) => TransferPhase::OutsideFinancialYear,
    }
}

// ─── Store access ─────────────────────────────────────────────────────────────

async fn latest_snapshot_date(
    tx: &mut Transaction<'_, Postgres>,
    staff_id: Uuid,
    period: &str,
) -> AppResult<Option<NaiveDate>> {
    let date = sqlx::query_scalar::<_, Option<NaiveDate>>(
        "SELECT MAX(effective_date) FROM transfer_snapshots WHERE staff_id = $1 AND period = $2",
    )
    .bind(staff_id)
    .bind(period)
    .fetch_one(&mut **tx)
    .await?;
    Ok(date)
}

/// Prior snapshot rows for the staff member at one branch, keyed by KPI
async fn snapshot_targets(
    tx: &mut Transaction<'_, Postgres>,
    staff_id: Uuid,
    period: &str,
    branch: &str,
) -> AppResult<HashMap<String, Decimal>> {
    let rows = sqlx::query_as::<_, (String, Decimal)>(
        r#"SELECT kpi_code, target_amount FROM transfer_snapshots
           WHERE staff_id = $1 AND period = $2 AND branch_code = $3"#,
    )
    .bind(staff_id)
    .bind(period)
    .bind(branch)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().collect())
}

async fn published_branch_targets(
    tx: &mut Transaction<'_, Postgres>,
    period: &str,
    branch: &str,
) -> AppResult<Vec<(String, Decimal)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        r#"SELECT kpi_code, amount FROM targets
           WHERE period = $1 AND branch_code = $2 AND published
           ORDER BY kpi_code"#,
    )
    .bind(period)
    .bind(branch)
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(kpi, amount)| (kpi, Decimal::from(amount)))
        .collect())
}

/// Verified achievement of one staff member in one branch over
/// `[window_start, window_end)`, regardless of entry period
async fn verified_in_window(
    tx: &mut Transaction<'_, Postgres>,
    staff_id: Uuid,
    branch: &str,
    kpi: &str,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> AppResult<Decimal> {
    let sum = sqlx::query_scalar::<_, Decimal>(
        r#"SELECT COALESCE(SUM(value), 0) FROM entries
           WHERE staff_id = $1 AND branch_code = $2 AND kpi_code = $3
             AND status = 'verified'
             AND created_at::date >= $4 AND created_at::date < $5"#,
    )
    .bind(staff_id)
    .bind(branch)
    .bind(kpi)
    .bind(window_start)
    .bind(window_end)
    .fetch_one(&mut **tx)
    .await?;
    Ok(sum)
}

/// Write one snapshot row, updating in place when the same
/// (staff, period, branch, kpi) identity already exists
async fn upsert_snapshot(
    tx: &mut Transaction<'_, Postgres>,
    staff_id: Uuid,
    period: &str,
    branch: &str,
    kpi: &str,
    target_amount: Decimal,
    achieved_amount: Decimal,
    effective_date: NaiveDate,
) -> AppResult<TransferSnapshot> {
    let row = sqlx::query_as::<_, TransferSnapshot>(
        r#"INSERT INTO transfer_snapshots
               (id, staff_id, period, branch_code, kpi_code,
                target_amount, achieved_amount, effective_date, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
           ON CONFLICT (staff_id, period, branch_code, kpi_code) DO UPDATE
           SET target_amount = EXCLUDED.target_amount,
               achieved_amount = EXCLUDED.achieved_amount,
               effective_date = EXCLUDED.effective_date,
               updated_at = NOW()
           RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(staff_id)
    .bind(period)
    .bind(branch)
    .bind(kpi)
    .bind(target_amount)
    .bind(achieved_amount)
    .bind(effective_date)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

// ─── Transfer action ──────────────────────────────────────────────────────────

/// Execute a branch transfer atomically: regenerate the old branch's
/// allocations with the departing staff excluded, correct the old-branch
/// snapshot, and insert the new-branch snapshot.
pub async fn execute_transfer(
    db: &PgPool,
    req: &ExecuteTransferRequest,
) -> AppResult<TransferOutcome> {
    if req.old_branch == req.new_branch {
        return Err(AppError::Validation(
            "Old and new branch must differ".to_string(),
        ));
    }
    let (fy_start, fy_end) = financial_year_window(&req.period)?;

    let staff = sqlx::query_as::<_, StaffMember>("SELECT * FROM staff_members WHERE id = $1")
        .bind(req.staff_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Staff member {} not found", req.staff_id)))?;

    let mut tx = db.begin().await?;

    // The departing staff member leaves the old branch's split before any
    // proration. A branch left without targets or eligible staff just has
    // its stale allocations cleared.
    if req.role.is_allocatable() {
        match allocator::regenerate_allocations(
            &mut tx,
            &req.period,
            &req.old_branch,
            Some(req.staff_id),
        )
        .await
        {
            Ok(_) => {}
            Err(AppError::NoTargetsFound { .. }) | Err(AppError::NoEligibleStaff { .. }) => {
                allocator::clear_allocations(&mut tx, &req.period, &req.old_branch).await?;
            }
            Err(e) => return Err(e),
        }
    }

    let prior_date = latest_snapshot_date(&mut tx, req.staff_id, &req.period).await?;
    let phase = determine_phase(prior_date, fy_start, fy_end);

    let (old_rows, new_rows) = match (phase, prior_date) {
        (TransferPhase::NoPriorTransfer | TransferPhase::OutsideFinancialYear, _) | (_, None) => {
            // Old branch: its published targets prorated from the start of
            // the financial year to this transfer.
            let old_targets = published_branch_targets(&mut tx, &req.period, &req.old_branch).await?;
            let months_old = months_between(fy_start, req.transfer_date);
            let mut old_rows = Vec::with_capacity(old_targets.len());
            for (kpi, amount) in &old_targets {
                let achieved = verified_in_window(
                    &mut tx,
                    req.staff_id,
                    &req.old_branch,
                    kpi,
                    fy_start,
                    req.transfer_date,
                )
                .await?;
                old_rows.push(
                    upsert_snapshot(
                        &mut tx,
                        req.staff_id,
                        &req.period,
                        &req.old_branch,
                        kpi,
                        prorate(*amount, months_old),
                        achieved,
                        req.transfer_date,
                    )
                    .await?,
                );
            }

            // New branch: its targets prorated from the transfer to the end
            // of the financial year.
            let new_targets = published_branch_targets(&mut tx, &req.period, &req.new_branch).await?;
            let months_new = months_between(req.transfer_date, fy_end);
            let mut new_rows = Vec::with_capacity(new_targets.len());
            for (kpi, amount) in &new_targets {
                new_rows.push(
                    upsert_snapshot(
                        &mut tx,
                        req.staff_id,
                        &req.period,
                        &req.new_branch,
                        kpi,
                        prorate(*amount, months_new),
                        Decimal::ZERO,
                        req.transfer_date,
                    )
                    .await?,
                );
            }
            (old_rows, new_rows)
        }
        (TransferPhase::InsideFinancialYear, Some(prior)) => {
            // Old branch: the prior snapshot's stored targets prorated over
            // the months since that snapshot, achieved restricted to
            // [prior, transfer_date). A missing prior row for a KPI falls
            // back to the branch target measured from the FY start.
            let prior_targets =
                snapshot_targets(&mut tx, req.staff_id, &req.period, &req.old_branch).await?;
            let months_elapsed = months_between(prior, req.transfer_date);
            let mut per_kpi: Vec<(String, Decimal, i64)> = prior_targets
                .iter()
                .map(|(kpi, target)| (kpi.clone(), *target, months_elapsed))
                .collect();
            if per_kpi.is_empty() {
                let months_old = months_between(fy_start, req.transfer_date);
                per_kpi = published_branch_targets(&mut tx, &req.period, &req.old_branch)
                    .await?
                    .into_iter()
                    .map(|(kpi, amount)| (kpi, amount, months_old))
                    .collect();
            }
            per_kpi.sort_by(|a, b| a.0.cmp(&b.0));

            let mut old_rows = Vec::with_capacity(per_kpi.len());
            for (kpi, target, months) in &per_kpi {
                let achieved = verified_in_window(
                    &mut tx,
                    req.staff_id,
                    &req.old_branch,
                    kpi,
                    prior,
                    req.transfer_date,
                )
                .await?;
                old_rows.push(
                    upsert_snapshot(
                        &mut tx,
                        req.staff_id,
                        &req.period,
                        &req.old_branch,
                        kpi,
                        prorate(*target, *months),
                        achieved,
                        req.transfer_date,
                    )
                    .await?,
                );
            }

            // New branch: covered from the prior snapshot date to the end
            // of the financial year.
            let new_targets = published_branch_targets(&mut tx, &req.period, &req.new_branch).await?;
            let months_new = months_between(prior, fy_end);
            let mut new_rows = Vec::with_capacity(new_targets.len());
            for (kpi, amount) in &new_targets {
                new_rows.push(
                    upsert_snapshot(
                        &mut tx,
                        req.staff_id,
                        &req.period,
                        &req.new_branch,
                        kpi,
                        prorate(*amount, months_new),
                        Decimal::ZERO,
                        req.transfer_date,
                    )
                    .await?,
                );
            }
            (old_rows, new_rows)
        }
    };

    // The staff record itself moves with the transfer
    sqlx::query(
        r#"UPDATE staff_members
           SET branch_code = $1, transfer_date = $2, updated_at = NOW()
           WHERE id = $3"#,
    )
    .bind(&req.new_branch)
    .bind(req.transfer_date)
    .bind(req.staff_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Transfer committed for {} ({}) {} → {} in period {} ({})",
        staff.name,
        req.staff_id,
        req.old_branch,
        req.new_branch,
        req.period,
        phase.as_str()
    );

    Ok(TransferOutcome {
        staff_id: req.staff_id,
        period: req.period.clone(),
        old_branch: req.old_branch.clone(),
        new_branch: req.new_branch.clone(),
        phase: phase.as_str().to_string(),
        old_branch_snapshot: old_rows,
        new_branch_snapshot: new_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn financial_year_starts_in_april() {
        let (start, end) = financial_year_window("2025-09").unwrap();
        assert_eq!(start, date(2025, 4, 1));
        assert_eq!(end, date(2026, 3, 31));

        // January through March belong to the previous year's window
        let (start, end) = financial_year_window("2025-02").unwrap();
        assert_eq!(start, date(2024, 4, 1));
        assert_eq!(end, date(2025, 3, 31));
    }

    #[test]
    fn malformed_periods_are_rejected() {
        assert!(financial_year_window("2025").is_err());
        assert!(financial_year_window("2025-13").is_err());
        assert!(financial_year_window("sep-2025").is_err());
    }

    #[test]
    fn months_between_ignores_day_of_month() {
        assert_eq!(months_between(date(2025, 4, 1), date(2025, 8, 15)), 4);
        assert_eq!(months_between(date(2025, 4, 30), date(2025, 8, 1)), 4);
        assert_eq!(months_between(date(2025, 4, 1), date(2026, 3, 31)), 11);
    }

    #[test]
    fn months_between_floors_at_zero() {
        assert_eq!(months_between(date(2025, 8, 1), date(2025, 4, 1)), 0);
        assert_eq!(months_between(date(2025, 8, 1), date(2025, 8, 31)), 0);
    }

    #[test]
    fn proration_uses_month_fraction() {
        assert_eq!(prorate(dec!(120000), 4), dec!(40000));
        assert_eq!(prorate(dec!(25000000), 0), Decimal::ZERO);
        // 4 elapsed months of the worked example
        let months = months_between(date(2025, 4, 1), date(2025, 8, 15));
        assert_eq!(prorate(dec!(90000), months), dec!(30000));
    }

    #[test]
    fn phase_follows_prior_snapshot_and_window() {
        let (fy_start, fy_end) = financial_year_window("2025-09").unwrap();
        assert_eq!(
            determine_phase(None, fy_start, fy_end),
            TransferPhase::NoPriorTransfer
        );
        assert_eq!(
            determine_phase(Some(date(2025, 4, 1)), fy_start, fy_end),
            TransferPhase::InsideFinancialYear
        );
        assert_eq!(
            determine_phase(Some(date(2024, 6, 1)), fy_start, fy_end),
            TransferPhase::OutsideFinancialYear
        );
    }

    #[test]
    fn old_and_new_windows_cover_the_financial_year_consistently() {
        let (fy_start, fy_end) = financial_year_window("2025-09").unwrap();
        let transfer = date(2025, 8, 15);
        let old_months = months_between(fy_start, transfer);
        let new_months = months_between(transfer, fy_end);
        assert_eq!(old_months + new_months, months_between(fy_start, fy_end));
        // a target split across both windows reconstructs its whole-window
        // proration exactly
        let target = dec!(24000000);
        assert_eq!(
            prorate(target, old_months) + prorate(target, new_months),
            prorate(target, old_months + new_months)
        );
    }
}
