// src/models/mod.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// ─── Branch ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Branch {
    pub code: String,
    pub name: String,
    /// Supervising officer (AGM/DGM) the branch reports to, if assigned
    pub incharge: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ─── Staff ────────────────────────────────────────────────────────────────────

// sqlx 0.8: custom Postgres enums need #[sqlx(type_name = "...")] on the enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq, Eq)]
#[sqlx(type_name = "staff_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Clerk,
    Attender,
    Bm,
    HoStaff,
    Agm,
    Dgm,
    Gm,
}

impl StaffRole {
    /// Roles that receive individual allocations of branch targets
    pub fn is_allocatable(self) -> bool {
        matches!(self, StaffRole::Clerk | StaffRole::Attender)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct StaffMember {
    pub id: Uuid,
    pub name: String,
    pub role: StaffRole,
    pub branch_code: String,
    /// Supervisor ("head of department") reference
    pub hod: Option<Uuid>,
    pub transfer_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── KPI Catalog & Weightage ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Kpi {
    pub code: String,
    pub name: String,
    /// Whether branch targets for this KPI are split across staff.
    /// Branch-level-only KPIs (insurance, recovery) are never allocated;
    /// audit is assigned flat, not split.
    pub individually_allocable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Weightage {
    pub id: Uuid,
    pub kpi_code: String,
    /// Percentage weight of this KPI within an entity's total score
    pub percentage: Decimal,
}

// ─── Targets & Allocations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Target {
    pub id: Uuid,
    /// Format: "YYYY-MM"
    pub period: String,
    pub branch_code: String,
    pub kpi_code: String,
    /// Whole currency units
    pub amount: i64,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Allocation {
    pub id: Uuid,
    pub period: String,
    pub branch_code: String,
    pub staff_id: Uuid,
    pub kpi_code: String,
    pub amount: i64,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

// ─── Achievement Entries ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq, Eq)]
#[sqlx(type_name = "entry_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Verified,
    Returned,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Entry {
    pub id: Uuid,
    pub period: String,
    pub branch_code: String,
    pub staff_id: Uuid,
    pub kpi_code: String,
    pub value: Decimal,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
}

// ─── Role-KPI Mappings & Manual Entries ───────────────────────────────────────

/// How a supervisor-level mapped KPI resolves to a value during roll-up.
/// Stored explicitly per mapping; mappings without a tag fall back to
/// keyword classification of the KPI name (last matching rule wins).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, ToSchema, PartialEq, Eq)]
#[sqlx(type_name = "rollup_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RollupCategory {
    SectionAverage,
    BranchAverage,
    ManualLookup,
    InsuranceDirect,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RoleKpiMapping {
    pub id: Uuid,
    pub role: StaffRole,
    pub kpi_name: String,
    /// Doubles as the achievement target for generic/manual KPIs
    pub weightage: Decimal,
    pub category: Option<RollupCategory>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ManualEntry {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub mapping_id: Uuid,
    pub period: String,
    pub value: Decimal,
    pub created_at: DateTime<Utc>,
}

// ─── Transfer Snapshots ───────────────────────────────────────────────────────

/// Per-KPI prorated target/achieved values written when a staff member
/// changes branch mid-period. One row per (staff, period, branch, kpi).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TransferSnapshot {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub period: String,
    pub branch_code: String,
    pub kpi_code: String,
    pub target_amount: Decimal,
    pub achieved_amount: Decimal,
    /// The date this snapshot's proration window starts from
    pub effective_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct ComputeAllocationRequest {
    /// Format: "YYYY-MM"
    pub period: String,
    pub branch: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExecuteTransferRequest {
    pub staff_id: Uuid,
    /// Format: "YYYY-MM"
    pub period: String,
    pub old_branch: String,
    pub new_branch: String,
    pub role: StaffRole,
    pub transfer_date: NaiveDate,
}

// ─── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, ToSchema)]
pub struct AllocationSummary {
    pub period: String,
    pub branch: String,
    pub staff_count: usize,
    pub allocations_created: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KpiScoreDetail {
    pub kpi: String,
    pub score: Decimal,
    pub target: Decimal,
    pub achieved: Decimal,
    pub weightage: Decimal,
    pub weightage_score: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreReport {
    pub entity_id: String,
    pub period: String,
    pub per_kpi: Vec<KpiScoreDetail>,
    pub total: Decimal,
}

impl ScoreReport {
    /// Round every figure to 2 decimal places for the API boundary.
    /// Internal computation keeps full precision.
    pub fn rounded(mut self) -> Self {
        for row in &mut self.per_kpi {
            row.score = row.score.round_dp(2);
            row.target = row.target.round_dp(2);
            row.achieved = row.achieved.round_dp(2);
            row.weightage = row.weightage.round_dp(2);
            row.weightage_score = row.weightage_score.round_dp(2);
        }
        self.total = self.total.round_dp(2);
        self
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransferOutcome {
    pub staff_id: Uuid,
    pub period: String,
    pub old_branch: String,
    pub new_branch: String,
    /// Which proration path was taken
    pub phase: String,
    pub old_branch_snapshot: Vec<TransferSnapshot>,
    pub new_branch_snapshot: Vec<TransferSnapshot>,
}

impl TransferOutcome {
    /// Round snapshot amounts to 2 decimal places for the API boundary
    pub fn rounded(mut self) -> Self {
        for row in self
            .old_branch_snapshot
            .iter_mut()
            .chain(self.new_branch_snapshot.iter_mut())
        {
            row.target_amount = row.target_amount.round_dp(2);
            row.achieved_amount = row.achieved_amount.round_dp(2);
        }
        self
    }
}
