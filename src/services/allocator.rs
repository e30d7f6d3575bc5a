// src/services/allocator.rs

use crate::{
    errors::{AppError, AppResult},
    models::{AllocationSummary, Branch},
    services::scoring::KPI_AUDIT,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

/// A published branch target joined with its catalog split flag
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct TargetSpec {
    pub kpi_code: String,
    pub amount: i64,
    pub individually_allocable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedAllocation {
    pub staff_id: Uuid,
    pub kpi_code: String,
    pub amount: i64,
}

/// Equal split of `total` across `count` shares: the first `total mod count`
/// shares get one extra unit, so the shares always reconstruct the total
/// exactly.
pub fn split_amounts(total: i64, count: usize) -> Vec<i64> {
    let n = count as i64;
    let base = total / n;
    let remainder = total % n;
    (0..n)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Expand branch targets into per-staff allocation rows. Splittable KPIs are
/// divided remainder-fair in roster order; the audit target is assigned in
/// full to every staff member; branch-level-only KPIs produce no rows.
pub(crate) fn plan_allocations(targets: &[TargetSpec], staff: &[Uuid]) -> Vec<PlannedAllocation> {
    if staff.is_empty() {
        return Vec::new();
    }
    let mut plan = Vec::new();
    for target in targets {
        if target.individually_allocable {
            let shares = split_amounts(target.amount, staff.len());
            for (staff_id, amount) in staff.iter().zip(shares) {
                plan.push(PlannedAllocation {
                    staff_id: *staff_id,
                    kpi_code: target.kpi_code.clone(),
                    amount,
                });
            }
        } else if target.kpi_code == KPI_AUDIT {
            for staff_id in staff {
                plan.push(PlannedAllocation {
                    staff_id: *staff_id,
                    kpi_code: target.kpi_code.clone(),
                    amount: target.amount,
                });
            }
        }
    }
    plan
}

async fn published_targets(
    tx: &mut Transaction<'_, Postgres>,
    period: &str,
    branch: &str,
) -> AppResult<Vec<TargetSpec>> {
    let targets = sqlx::query_as::<_, TargetSpec>(
        r#"SELECT t.kpi_code, t.amount, k.individually_allocable
           FROM targets t
           JOIN kpis k ON k.code = t.kpi_code
           WHERE t.period = $1 AND t.branch_code = $2 AND t.published
           ORDER BY t.kpi_code"#,
    )
    .bind(period)
    .bind(branch)
    .fetch_all(&mut **tx)
    .await?;
    Ok(targets)
}

/// Eligible roster in stable order; the allocator and the transfer engine
/// both rely on this ordering for deterministic remainder assignment.
async fn eligible_staff(
    tx: &mut Transaction<'_, Postgres>,
    branch: &str,
    exclude: Option<Uuid>,
) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"SELECT id FROM staff_members
           WHERE branch_code = $1
             AND role IN ('clerk', 'attender')
             AND is_active
             AND ($2::uuid IS NULL OR id != $2)
           ORDER BY created_at, id"#,
    )
    .bind(branch)
    .bind(exclude)
    .fetch_all(&mut **tx)
    .await?;
    Ok(ids)
}

/// Remove every allocation row for the (period, branch) pair
pub(crate) async fn clear_allocations(
    tx: &mut Transaction<'_, Postgres>,
    period: &str,
    branch: &str,
) -> AppResult<()> {
    sqlx::query("DELETE FROM allocations WHERE period = $1 AND branch_code = $2")
        .bind(period)
        .bind(branch)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Delete-then-insert regeneration of a branch's allocations inside the
/// caller's transaction. Aborts before any write when there are no published
/// targets or no eligible staff, so a failure never leaves a partial set.
pub(crate) async fn regenerate_allocations(
    tx: &mut Transaction<'_, Postgres>,
    period: &str,
    branch: &str,
    exclude: Option<Uuid>,
) -> AppResult<(usize, usize)> {
    let targets = published_targets(tx, period, branch).await?;
    if targets.is_empty() {
        return Err(AppError::NoTargetsFound {
            branch: branch.to_string(),
            period: period.to_string(),
        });
    }

    let staff = eligible_staff(tx, branch, exclude).await?;
    if staff.is_empty() {
        return Err(AppError::NoEligibleStaff {
            branch: branch.to_string(),
        });
    }

    clear_allocations(tx, period, branch).await?;

    let plan = plan_allocations(&targets, &staff);
    for row in &plan {
        sqlx::query(
            r#"INSERT INTO allocations (id, period, branch_code, staff_id, kpi_code, amount, published, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW())"#,
        )
        .bind(Uuid::new_v4())
        .bind(period)
        .bind(branch)
        .bind(row.staff_id)
        .bind(&row.kpi_code)
        .bind(row.amount)
        .execute(&mut **tx)
        .await?;
    }

    Ok((staff.len(), plan.len()))
}

/// Split the branch's published targets across its eligible staff for a
/// period, replacing any previous allocation set atomically.
pub async fn compute_allocation(
    db: &PgPool,
    period: &str,
    branch: &str,
) -> AppResult<AllocationSummary> {
    let branch_row = sqlx::query_as::<_, Branch>("SELECT * FROM branches WHERE code = $1")
        .bind(branch)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Branch {branch} not found")))?;

    let mut tx = db.begin().await?;
    let (staff_count, created) = regenerate_allocations(&mut tx, period, branch, None).await?;
    tx.commit().await?;

    info!(
        "Allocations regenerated for {} ({}) period {}: {} rows across {} staff",
        branch_row.name, branch, period, created, staff_count
    );

    Ok(AllocationSummary {
        period: period.to_string(),
        branch: branch.to_string(),
        staff_count,
        allocations_created: created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kpi: &str, amount: i64, allocable: bool) -> TargetSpec {
        TargetSpec {
            kpi_code: kpi.to_string(),
            amount,
            individually_allocable: allocable,
        }
    }

    #[test]
    fn split_reconstructs_total_exactly() {
        let shares = split_amounts(25_000_000, 3);
        assert_eq!(shares, vec![8_333_334, 8_333_333, 8_333_333]);
        assert_eq!(shares.iter().sum::<i64>(), 25_000_000);
    }

    #[test]
    fn split_gives_extra_unit_to_first_remainder_shares() {
        let total = 1_000_007i64;
        let n = 5usize;
        let shares = split_amounts(total, n);
        let base = total / n as i64;
        let remainder = (total % n as i64) as usize;
        assert_eq!(shares.iter().filter(|&&s| s == base + 1).count(), remainder);
        assert_eq!(shares.iter().filter(|&&s| s == base).count(), n - remainder);
        assert_eq!(shares.iter().sum::<i64>(), total);
    }

    #[test]
    fn split_of_even_total_is_uniform() {
        assert_eq!(split_amounts(900, 3), vec![300, 300, 300]);
    }

    #[test]
    fn plan_splits_allocable_and_flattens_audit() {
        let staff: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let targets = vec![
            spec("deposit", 10, true),
            spec("audit", 500, false),
            spec("insurance", 40000, false),
        ];
        let plan = plan_allocations(&targets, &staff);

        let deposit: Vec<i64> = plan
            .iter()
            .filter(|p| p.kpi_code == "deposit")
            .map(|p| p.amount)
            .collect();
        assert_eq!(deposit, vec![4, 3, 3]);

        // every staff member carries the full audit target
        let audit: Vec<i64> = plan
            .iter()
            .filter(|p| p.kpi_code == "audit")
            .map(|p| p.amount)
            .collect();
        assert_eq!(audit, vec![500, 500, 500]);

        // branch-level-only KPIs are never allocated
        assert!(plan.iter().all(|p| p.kpi_code != "insurance"));
    }

    #[test]
    fn plan_remainder_follows_roster_order() {
        let staff: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let plan = plan_allocations(&[spec("loan_gen", 11, true)], &staff);
        let amounts: Vec<i64> = plan.iter().map(|p| p.amount).collect();
        assert_eq!(amounts, vec![3, 3, 3, 2]);
        assert_eq!(plan[0].staff_id, staff[0]);
        assert_eq!(plan[3].staff_id, staff[3]);
    }
}
