// src/openapi.rs

use crate::models::{
    Allocation, AllocationSummary, Branch, ComputeAllocationRequest, Entry, EntryStatus,
    ExecuteTransferRequest, Kpi, KpiScoreDetail, ManualEntry, RoleKpiMapping, RollupCategory,
    ScoreReport, StaffMember, StaffRole, Target, TransferOutcome, TransferSnapshot, Weightage,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "KPI Tracker API",
        version = "1.0.0",
        description = "Performance target tracking and scoring for a multi-branch \
            organization. Splits published branch targets across staff, converts \
            verified achievement entries into weighted scores, rolls scores up \
            through the management hierarchy, and prorates targets across branches \
            when staff transfer mid-period.",
        license(name = "MIT")
    ),
    paths(
        // Allocations
        crate::handlers::allocation::compute_allocation,
        crate::handlers::allocation::list_allocations,
        // Scores
        crate::handlers::scores::compute_score,
        // Transfers
        crate::handlers::transfer::execute_transfer,
    ),
    components(
        schemas(
            Branch, StaffMember, Kpi, Weightage, Target, Entry, RoleKpiMapping, ManualEntry,
            ComputeAllocationRequest, AllocationSummary, Allocation,
            ScoreReport, KpiScoreDetail, StaffRole, EntryStatus, RollupCategory,
            ExecuteTransferRequest, TransferOutcome, TransferSnapshot,
        )
    ),
    tags(
        (name = "Allocations", description = "Split branch targets across eligible staff"),
        (name = "Scores", description = "Per-entity KPI scoring and hierarchy roll-up"),
        (name = "Transfers", description = "Mid-period branch transfers with financial-year proration"),
    )
)]
pub struct ApiDoc;
