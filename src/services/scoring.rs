// src/services/scoring.rs

use crate::models::KpiScoreDetail;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const KPI_DEPOSIT: &str = "deposit";
pub const KPI_LOAN_GEN: &str = "loan_gen";
pub const KPI_LOAN_AMULYA: &str = "loan_amulya";
pub const KPI_INSURANCE: &str = "insurance";
pub const KPI_RECOVERY: &str = "recovery";
pub const KPI_AUDIT: &str = "audit";

/// Fixed achievement target for any mapped KPI literally named "insurance"
pub const INSURANCE_MANUAL_TARGET: Decimal = dec!(40000);

pub const MAX_SCORE: Decimal = dec!(12.5);
pub const MID_SCORE: Decimal = dec!(10);
pub const INSURANCE_PENALTY: Decimal = dec!(-2);

/// Companion ratio each of audit and recovery must reach before a
/// cross-conditioned growth KPI is granted the 12.5 tier
const COMPANION_FLOOR: Decimal = dec!(0.75);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KpiFamily {
    Growth,
    Volume,
    Insurance,
    Recovery,
    Audit,
}

pub fn family_of(code: &str) -> KpiFamily {
    match code {
        KPI_DEPOSIT | KPI_LOAN_GEN => KpiFamily::Growth,
        KPI_INSURANCE => KpiFamily::Insurance,
        KPI_RECOVERY => KpiFamily::Recovery,
        KPI_AUDIT => KpiFamily::Audit,
        _ => KpiFamily::Volume,
    }
}

/// How growth KPIs reach the top tier. Branch/BM scoring conditions the
/// 12.5 grant on companion audit and recovery performance; staff scoring
/// never does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowthMode {
    Simple,
    CrossConditioned {
        audit_ratio: Decimal,
        recovery_ratio: Decimal,
    },
}

/// Achievement-to-target inputs for one KPI of an entity's score set
#[derive(Debug, Clone)]
pub struct KpiInput {
    pub kpi: String,
    pub achieved: Decimal,
    pub target: Decimal,
    pub weightage: Decimal,
}

/// achieved/target, with a zero or absent target treated as ratio 0
pub fn ratio(achieved: Decimal, target: Decimal) -> Decimal {
    if target <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        achieved / target
    }
}

fn three_tier(r: Decimal, top: Decimal) -> Decimal {
    if r < Decimal::ONE {
        r * dec!(10)
    } else if r < dec!(1.25) {
        MID_SCORE
    } else {
        top
    }
}

/// Recovery/audit and manual-lookup curve: full score from ratio 1 upward
pub fn two_tier(r: Decimal) -> Decimal {
    if r < Decimal::ONE {
        r * dec!(10)
    } else {
        MAX_SCORE
    }
}

fn growth_score(r: Decimal, mode: GrowthMode, cap: Decimal) -> Decimal {
    if r < dec!(1.25) {
        return three_tier(r, cap);
    }
    match mode {
        GrowthMode::Simple => cap,
        GrowthMode::CrossConditioned {
            audit_ratio,
            recovery_ratio,
        } => {
            if audit_ratio >= COMPANION_FLOOR && recovery_ratio >= COMPANION_FLOOR {
                cap
            } else {
                MID_SCORE
            }
        }
    }
}

fn insurance_score(achieved: Decimal, target: Decimal) -> Decimal {
    if target <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if achieved == Decimal::ZERO {
        return INSURANCE_PENALTY;
    }
    three_tier(ratio(achieved, target), MAX_SCORE)
}

/// Score one KPI. The cap governs the 12.5 tier of the three-tier curve
/// (growth and volume families); the adaptive branch pass lowers it to 10
/// (see [`branch_score_set`]). Output clamps to the family bound.
pub fn score_kpi(
    code: &str,
    achieved: Decimal,
    target: Decimal,
    mode: GrowthMode,
    growth_cap: Decimal,
) -> Decimal {
    let r = ratio(achieved, target);
    match family_of(code) {
        KpiFamily::Growth => growth_score(r, mode, growth_cap).clamp(Decimal::ZERO, MAX_SCORE),
        KpiFamily::Volume => three_tier(r, growth_cap).clamp(Decimal::ZERO, MAX_SCORE),
        KpiFamily::Insurance => {
            insurance_score(achieved, target).clamp(INSURANCE_PENALTY, MAX_SCORE)
        }
        KpiFamily::Recovery | KpiFamily::Audit => two_tier(r).clamp(Decimal::ZERO, MAX_SCORE),
    }
}

/// score × weightage / 100, except the insurance-zero case, which is a
/// defined value of exactly -2 regardless of weightage
pub fn weightage_score(
    code: &str,
    score: Decimal,
    weightage: Decimal,
    achieved: Decimal,
    target: Decimal,
) -> Decimal {
    if family_of(code) == KpiFamily::Insurance
        && target > Decimal::ZERO
        && achieved == Decimal::ZERO
    {
        return INSURANCE_PENALTY;
    }
    score * weightage / dec!(100)
}

pub fn total_of(rows: &[KpiScoreDetail]) -> Decimal {
    rows.iter().map(|r| r.weightage_score).sum()
}

fn detail(input: &KpiInput, mode: GrowthMode, growth_cap: Decimal) -> KpiScoreDetail {
    let score = score_kpi(&input.kpi, input.achieved, input.target, mode, growth_cap);
    let ws = weightage_score(&input.kpi, score, input.weightage, input.achieved, input.target);
    KpiScoreDetail {
        kpi: input.kpi.clone(),
        score,
        target: input.target,
        achieved: input.achieved,
        weightage: input.weightage,
        weightage_score: ws,
    }
}

fn companion_ratios(inputs: &[KpiInput]) -> GrowthMode {
    let ratio_for = |code: &str| {
        inputs
            .iter()
            .find(|i| i.kpi == code)
            .map(|i| ratio(i.achieved, i.target))
            .unwrap_or(Decimal::ZERO)
    };
    GrowthMode::CrossConditioned {
        audit_ratio: ratio_for(KPI_AUDIT),
        recovery_ratio: ratio_for(KPI_RECOVERY),
    }
}

fn score_of(rows: &[KpiScoreDetail], code: &str) -> Decimal {
    rows.iter()
        .find(|r| r.kpi == code)
        .map(|r| r.score)
        .unwrap_or(Decimal::ZERO)
}

/// Staff-level score set: simple growth mode, no adaptive cap
pub fn staff_score_set(inputs: &[KpiInput]) -> Vec<KpiScoreDetail> {
    inputs
        .iter()
        .map(|i| detail(i, GrowthMode::Simple, MAX_SCORE))
        .collect()
}

/// Branch/BM score set: cross-conditioned growth plus the adaptive cap.
///
/// A preliminary pass caps the three-tier curves at 12.5. When the
/// preliminary total exceeds 10 while both insurance and recovery sit below
/// 7.5, the entire set is recomputed with the cap lowered to 10. The cap
/// shifts every capped score at once, so a second full pass replaces the
/// first wholesale rather than patching individual rows.
pub fn branch_score_set(inputs: &[KpiInput]) -> Vec<KpiScoreDetail> {
    let mode = companion_ratios(inputs);
    let preliminary: Vec<KpiScoreDetail> =
        inputs.iter().map(|i| detail(i, mode, MAX_SCORE)).collect();

    let threshold = dec!(7.5);
    if total_of(&preliminary) > MID_SCORE
        && score_of(&preliminary, KPI_INSURANCE) < threshold
        && score_of(&preliminary, KPI_RECOVERY) < threshold
    {
        return inputs.iter().map(|i| detail(i, mode, MID_SCORE)).collect();
    }
    preliminary
}

/// Detail row for a role-mapped KPI scored against its own weightage value.
/// A mapping literally named "insurance" is instead scored on the insurance
/// curve against the fixed 40000 target, penalty included.
pub fn mapped_kpi_detail(kpi_name: &str, weightage: Decimal, achieved: Decimal) -> KpiScoreDetail {
    let (target, score) = if kpi_name == KPI_INSURANCE {
        let t = INSURANCE_MANUAL_TARGET;
        (
            t,
            insurance_score(achieved, t).clamp(INSURANCE_PENALTY, MAX_SCORE),
        )
    } else {
        let t = weightage;
        (
            t,
            three_tier(ratio(achieved, t), MAX_SCORE).clamp(Decimal::ZERO, MAX_SCORE),
        )
    };
    let ws = weightage_score(kpi_name, score, weightage, achieved, target);
    KpiScoreDetail {
        kpi: kpi_name.to_string(),
        score,
        target,
        achieved,
        weightage,
        weightage_score: ws,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(kpi: &str, achieved: Decimal, target: Decimal, weightage: Decimal) -> KpiInput {
        KpiInput {
            kpi: kpi.to_string(),
            achieved,
            target,
            weightage,
        }
    }

    #[test]
    fn growth_curve_tiers() {
        let s = |a, t| score_kpi(KPI_DEPOSIT, a, t, GrowthMode::Simple, MAX_SCORE);
        assert_eq!(s(dec!(50), dec!(100)), dec!(5));
        assert_eq!(s(dec!(100), dec!(100)), dec!(10));
        assert_eq!(s(dec!(120), dec!(100)), dec!(10));
        assert_eq!(s(dec!(125), dec!(100)), dec!(12.5));
        assert_eq!(s(dec!(300), dec!(100)), dec!(12.5));
    }

    #[test]
    fn zero_target_scores_zero_without_division() {
        for kpi in [KPI_DEPOSIT, KPI_LOAN_AMULYA, KPI_INSURANCE, KPI_RECOVERY] {
            assert_eq!(
                score_kpi(kpi, dec!(500), Decimal::ZERO, GrowthMode::Simple, MAX_SCORE),
                Decimal::ZERO,
                "kpi {kpi}"
            );
        }
    }

    #[test]
    fn at_ratio_one_three_tier_scores_ten_and_two_tier_scores_full() {
        let t = dec!(80000);
        for kpi in [KPI_DEPOSIT, KPI_LOAN_AMULYA, KPI_INSURANCE] {
            assert_eq!(
                score_kpi(kpi, t, t, GrowthMode::Simple, MAX_SCORE),
                dec!(10),
                "kpi {kpi}"
            );
        }
        for kpi in [KPI_RECOVERY, KPI_AUDIT] {
            assert_eq!(
                score_kpi(kpi, t, t, GrowthMode::Simple, MAX_SCORE),
                dec!(12.5),
                "kpi {kpi}"
            );
        }
    }

    #[test]
    fn insurance_zero_is_penalty_not_missing_value() {
        for target in [dec!(1), dec!(40000), dec!(9000000)] {
            assert_eq!(
                score_kpi(KPI_INSURANCE, Decimal::ZERO, target, GrowthMode::Simple, MAX_SCORE),
                dec!(-2)
            );
        }
        // and the weightage score is exactly -2 regardless of weightage
        assert_eq!(
            weightage_score(KPI_INSURANCE, dec!(-2), dec!(5), Decimal::ZERO, dec!(40000)),
            dec!(-2)
        );
        assert_eq!(
            weightage_score(KPI_INSURANCE, dec!(-2), dec!(90), Decimal::ZERO, dec!(40000)),
            dec!(-2)
        );
    }

    #[test]
    fn negative_achievement_clamps_to_family_floor() {
        assert_eq!(
            score_kpi(KPI_DEPOSIT, dec!(-50), dec!(100), GrowthMode::Simple, MAX_SCORE),
            Decimal::ZERO
        );
        assert_eq!(
            score_kpi(KPI_INSURANCE, dec!(-50000), dec!(100), GrowthMode::Simple, MAX_SCORE),
            dec!(-2)
        );
    }

    #[test]
    fn cross_conditioned_growth_needs_both_companions() {
        let granted = GrowthMode::CrossConditioned {
            audit_ratio: dec!(0.8),
            recovery_ratio: dec!(0.75),
        };
        let denied = GrowthMode::CrossConditioned {
            audit_ratio: dec!(0.8),
            recovery_ratio: dec!(0.74),
        };
        assert_eq!(
            score_kpi(KPI_DEPOSIT, dec!(130), dec!(100), granted, MAX_SCORE),
            dec!(12.5)
        );
        assert_eq!(
            score_kpi(KPI_DEPOSIT, dec!(130), dec!(100), denied, MAX_SCORE),
            dec!(10)
        );
    }

    #[test]
    fn adaptive_cap_lowers_top_tier_when_all_conditions_hold() {
        // Volume overshoots while insurance and recovery both sit below
        // 7.5 and the preliminary total clears 10: the second pass caps
        // the 12.5 tier at 10.
        let inputs = vec![
            input(KPI_LOAN_AMULYA, dec!(130), dec!(100), dec!(50)),
            input(KPI_DEPOSIT, dec!(130), dec!(100), dec!(40)),
            input(KPI_AUDIT, dec!(100), dec!(100), dec!(10)),
            input(KPI_RECOVERY, dec!(70), dec!(100), dec!(10)),
            input(KPI_INSURANCE, dec!(70), dec!(100), dec!(10)),
        ];
        // preliminary: amulya 12.5*0.5 + deposit 10*0.4 (grant denied by
        // recovery 0.70) + audit 12.5*0.1 + recovery 7*0.1 + insurance 7*0.1
        // = 6.25 + 4 + 1.25 + 0.7 + 0.7 = 12.9 > 10
        let rows = branch_score_set(&inputs);
        assert_eq!(score_of(&rows, KPI_LOAN_AMULYA), dec!(10));
        assert_eq!(score_of(&rows, KPI_DEPOSIT), dec!(10));
        assert_eq!(score_of(&rows, KPI_AUDIT), dec!(12.5));
    }

    #[test]
    fn adaptive_cap_keeps_high_cap_when_any_condition_fails() {
        // Recovery at target: its 12.5 score fails the < 7.5 condition
        let inputs = vec![
            input(KPI_LOAN_AMULYA, dec!(130), dec!(100), dec!(50)),
            input(KPI_DEPOSIT, dec!(130), dec!(100), dec!(40)),
            input(KPI_AUDIT, dec!(90), dec!(100), dec!(5)),
            input(KPI_RECOVERY, dec!(100), dec!(100), dec!(10)),
            input(KPI_INSURANCE, dec!(10), dec!(100), dec!(5)),
        ];
        let rows = branch_score_set(&inputs);
        assert_eq!(score_of(&rows, KPI_LOAN_AMULYA), dec!(12.5));
        // companions audit 0.9 / recovery 1.0 grant deposit the top tier too
        assert_eq!(score_of(&rows, KPI_DEPOSIT), dec!(12.5));
    }

    #[test]
    fn weightage_scores_sum_into_total() {
        let inputs = vec![
            input(KPI_DEPOSIT, dec!(100), dec!(100), dec!(50)),
            input(KPI_AUDIT, dec!(100), dec!(100), dec!(50)),
        ];
        let rows = staff_score_set(&inputs);
        // 10 * 50/100 + 12.5 * 50/100
        assert_eq!(total_of(&rows), dec!(11.25));
    }

    #[test]
    fn mapped_kpi_target_is_its_own_weightage() {
        let row = mapped_kpi_detail("work_performance", dec!(20), dec!(20));
        assert_eq!(row.target, dec!(20));
        assert_eq!(row.score, dec!(10));
        assert_eq!(row.weightage_score, dec!(2));
    }

    #[test]
    fn mapped_kpi_three_tier_pins_mid_band_at_ten() {
        // ratio in [1, 1.25) stays at 10 on this call path
        let row = mapped_kpi_detail("allocated_work", dec!(20), dec!(24));
        assert_eq!(row.score, dec!(10));
        let row = mapped_kpi_detail("allocated_work", dec!(20), dec!(25));
        assert_eq!(row.score, dec!(12.5));
    }

    #[test]
    fn mapped_insurance_uses_fixed_target_and_penalty() {
        let row = mapped_kpi_detail(KPI_INSURANCE, dec!(10), dec!(40000));
        assert_eq!(row.target, dec!(40000));
        assert_eq!(row.score, dec!(10));
        let zero = mapped_kpi_detail(KPI_INSURANCE, dec!(10), Decimal::ZERO);
        assert_eq!(zero.score, dec!(-2));
        assert_eq!(zero.weightage_score, dec!(-2));
    }
}
