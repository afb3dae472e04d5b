//! Candidate generator and checklist normaliser (§4.5): filters the
//! externally-supplied candidate list down to geometry-valid, gate-passing
//! spreads and attaches payoff/probability metrics to each survivor.

use std::collections::BTreeMap;

use crate::config::DecisionMode;
use crate::freshness::{apply_contract_to_rows, DataContract};
use crate::payoff::{compute_iron_payoff, compute_pop_and_touch, compute_vertical_payoff, estimate_ev_iron, estimate_ev_vertical, SpreadSide};
use crate::types::candidate::{ChecklistSection, ChecklistStatus};
use crate::types::snapshot::{DteTargetEntry, LegAction};
use crate::types::vol::VolPolicy;
use crate::types::{CandidateCard, DecisionCode, Reason};

pub struct CandidateEvaluation {
    pub card: CandidateCard,
    pub keep: bool,
    pub blocks: Vec<Reason>,
    pub soft_warnings: Vec<Reason>,
}

fn side_for_direction(direction: crate::types::SpreadDirection) -> SpreadSide {
    match direction {
        crate::types::SpreadDirection::BullPut => SpreadSide::PutCredit,
        crate::types::SpreadDirection::BearCall => SpreadSide::CallCredit,
    }
}

fn soft_warning_code_from_row_name(name: &str) -> DecisionCode {
    let lower = name.to_ascii_lowercase();
    if lower.contains("delta") {
        DecisionCode::DeltaOutOfBand
    } else if lower.contains("sd") || lower.contains("standard deviation") {
        DecisionCode::SdMultipleLow
    } else if lower.contains("measured move") || lower.contains("mmc") {
        DecisionCode::MmcGateFail
    } else if lower.contains("support") || lower.contains("resistance") || lower.contains("sr buffer") {
        DecisionCode::SrBufferThin
    } else if lower.contains("trend") {
        DecisionCode::TrendMismatch
    } else if lower.contains("credit") && lower.contains("efficiency") {
        DecisionCode::LowCreditEfficiency
    } else {
        DecisionCode::HardGatesNotMet
    }
}

fn optional_warning_code_from_row_name(name: &str) -> DecisionCode {
    let lower = name.to_ascii_lowercase();
    if lower.contains("slippage") || lower.contains("spread width") {
        DecisionCode::SoftSlippageWarning
    } else {
        DecisionCode::SoftLiquidityWarning
    }
}

/// Attempts vertical (2-leg) or iron (4-leg) geometry detection and runs
/// the matching §4.1 payoff function, writing results onto `card.metrics`.
fn apply_payoff_metrics(card: &mut CandidateCard, spot: f64, iv_atm: f64) -> Result<(), DecisionCode> {
    let multiplier = 100.0;
    let contracts = 1;

    match card.legs.len() {
        2 => {
            let short = card.legs.iter().find(|l| l.action == LegAction::Sell).ok_or(DecisionCode::InvalidSpreadGeometry)?;
            let long = card.legs.iter().find(|l| l.action == LegAction::Buy).ok_or(DecisionCode::InvalidSpreadGeometry)?;
            let side = side_for_direction(card.direction);
            let payoff = compute_vertical_payoff(side, short.strike, long.strike, card.credit, contracts, multiplier)?;
            let pop = compute_pop_and_touch(side, payoff.breakeven, short.strike, spot, f64::from(card.dte), iv_atm);
            let ev = estimate_ev_vertical(side, short.strike, long.strike, card.credit, contracts, multiplier, spot, f64::from(card.dte), iv_atm, &card.candidate_id);

            card.metrics.max_profit = Some(payoff.max_profit);
            card.metrics.max_loss = Some(payoff.max_loss);
            card.metrics.ror = payoff.ror;
            card.metrics.breakeven = Some(payoff.breakeven);
            card.metrics.credit_pct = Some(payoff.credit_pct);
            card.metrics.pop = pop.pop;
            card.metrics.pot = pop.pot;
            card.metrics.ev = Some(ev);
            Ok(())
        }
        4 => {
            let mut sells: Vec<_> = card.legs.iter().filter(|l| l.action == LegAction::Sell).collect();
            sells.sort_by(|a, b| a.strike.partial_cmp(&b.strike).expect("strikes are finite"));
            let (Some(short_put), Some(short_call)) = (sells.first(), sells.get(1)) else {
                return Err(DecisionCode::InvalidSpreadGeometry);
            };
            let payoff = compute_iron_payoff(short_put.strike, short_call.strike, card.width, card.credit, contracts, multiplier)?;
            let ev = estimate_ev_iron(short_put.strike, short_call.strike, card.width, card.credit, contracts, multiplier, spot, f64::from(card.dte), iv_atm, &card.candidate_id);

            card.metrics.max_profit = Some(payoff.max_profit);
            card.metrics.max_loss = Some(payoff.max_loss);
            card.metrics.ror = payoff.ror;
            card.metrics.breakeven_low = Some(payoff.breakeven_low);
            card.metrics.breakeven_high = Some(payoff.breakeven_high);
            card.metrics.credit_pct = Some(payoff.credit_pct);
            card.metrics.ev = Some(ev);
            Ok(())
        }
        _ => Err(DecisionCode::InvalidSpreadGeometry),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn evaluate_candidates(
    candidates: &[CandidateCard],
    contract: &DataContract,
    vol_policy: &VolPolicy,
    mode: DecisionMode,
    feature_0dte: bool,
    dte_targets: &BTreeMap<u32, DteTargetEntry>,
    spot: f64,
    iv_atm: f64,
) -> Vec<CandidateEvaluation> {
    candidates
        .iter()
        .cloned()
        .map(|mut card| {
            let mut blocks = Vec::new();
            let mut soft_warnings = Vec::new();
            let dte_bucket = card.dte;

            if !feature_0dte && dte_bucket < 2 {
                blocks.push(Reason::new(DecisionCode::Feature0dteDisabled, "0-DTE candidates are disabled"));
                return CandidateEvaluation { card, keep: false, blocks, soft_warnings };
            }

            apply_contract_to_rows(&mut card.global_checklist, ChecklistSection::Global, contract);
            apply_contract_to_rows(&mut card.regime_checklist, ChecklistSection::Regime, contract);
            apply_contract_to_rows(&mut card.strategy_checklist, ChecklistSection::Strategy, contract);

            if let Err(code) = apply_payoff_metrics(&mut card, spot, iv_atm) {
                card.hard_block_code = Some(code);
                blocks.push(Reason::new(code, "candidate geometry is invalid"));
                return CandidateEvaluation { card, keep: false, blocks, soft_warnings };
            }

            if !dte_targets.get(&dte_bucket).is_some_and(|entry| entry.expiration.is_some()) {
                blocks.push(Reason::new(DecisionCode::MissingExpiryForBucket, "no expiration resolved for this DTE bucket").with_details(serde_json::json!({"dte_bucket": dte_bucket})));
            }

            let bucket_allowed = vol_policy.is_bucket_allowed(dte_bucket);
            if !bucket_allowed {
                let reason = Reason::new(DecisionCode::VolPolicyBucketDisabled, "DTE bucket disabled by current volatility policy")
                    .with_details(serde_json::json!({"dte_bucket": dte_bucket}));
                if mode == DecisionMode::Strict {
                    blocks.push(reason);
                } else {
                    soft_warnings.push(reason);
                }
            }

            let mut required_hard_failure = false;
            for item in card.all_checklist_items() {
                if !item.required {
                    if matches!(item.status, ChecklistStatus::Fail | ChecklistStatus::Blocked) {
                        soft_warnings.push(Reason::new(optional_warning_code_from_row_name(&item.name), item.detail.clone()));
                    }
                    continue;
                }
                if matches!(item.status, ChecklistStatus::Fail | ChecklistStatus::Blocked) {
                    let code = if item.status == ChecklistStatus::Blocked {
                        DecisionCode::HardGatesNotMet
                    } else {
                        soft_warning_code_from_row_name(&item.name)
                    };
                    match mode {
                        DecisionMode::Strict => {
                            required_hard_failure = true;
                            blocks.push(Reason::new(code, item.detail.clone()));
                        }
                        DecisionMode::Probabilistic => {
                            soft_warnings.push(Reason::new(code, item.detail.clone()));
                        }
                    }
                }
            }

            let keep = match mode {
                DecisionMode::Strict => card.ready && !required_hard_failure && blocks.is_empty(),
                DecisionMode::Probabilistic => true,
            };

            CandidateEvaluation { card, keep, blocks, soft_warnings }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::ContractStatus;
    use crate::types::candidate::{CandidateMetrics, ChecklistItem};
    use crate::types::snapshot::{OptionKind, OptionLeg};
    use crate::types::SpreadDirection;

    fn healthy_contract() -> DataContract {
        DataContract { status: ContractStatus::Healthy, feeds: Default::default() }
    }

    fn open_policy() -> VolPolicy {
        VolPolicy {
            regime: crate::types::VolRegime::VolNormal,
            allowed_dte_buckets: std::collections::BTreeSet::from([2, 7, 14, 30, 45]),
            adjustments: Default::default(),
        }
    }

    fn leg(action: LegAction, kind: OptionKind, strike: f64) -> OptionLeg {
        OptionLeg { action, kind, strike, delta: -0.1, gamma: Some(0.05), premium: None, qty: None, implied_vol: None }
    }

    fn passing_card(dte: u32) -> CandidateCard {
        CandidateCard {
            candidate_id: "cand_test".into(),
            strategy: "BULL_PUT".into(),
            ready: true,
            width: 5.0,
            credit: 1.5,
            adjusted_premium: 1.5,
            legs: vec![leg(LegAction::Sell, OptionKind::Put, 100.0), leg(LegAction::Buy, OptionKind::Put, 95.0)],
            direction: SpreadDirection::BullPut,
            dte,
            bid_ask_spread: None,
            global_checklist: vec![],
            regime_checklist: vec![],
            strategy_checklist: vec![],
            hard_block_code: None,
            metrics: CandidateMetrics::default(),
        }
    }

    fn dte_targets_with(bucket: u32) -> BTreeMap<u32, DteTargetEntry> {
        let mut map = BTreeMap::new();
        map.insert(bucket, DteTargetEntry { selected_dte: Some(bucket), expiration: Some(chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap()), recommendation: None });
        map
    }

    #[test]
    fn valid_vertical_candidate_is_kept_in_strict_mode() {
        let card = passing_card(7);
        let out = evaluate_candidates(&[card], &healthy_contract(), &open_policy(), DecisionMode::Strict, false, &dte_targets_with(7), 100.0, 0.2);
        assert!(out[0].keep);
        assert!(out[0].blocks.is_empty());
        assert!(out[0].card.metrics.max_profit.is_some());
        assert!(out[0].card.metrics.ev.is_some());
    }

    #[test]
    fn invalid_geometry_hard_blocks_regardless_of_mode() {
        let mut card = passing_card(7);
        card.legs = vec![leg(LegAction::Sell, OptionKind::Put, 100.0)];
        let out = evaluate_candidates(&[card], &healthy_contract(), &open_policy(), DecisionMode::Probabilistic, false, &dte_targets_with(7), 100.0, 0.2);
        assert!(!out[0].keep);
        assert!(out[0].blocks.iter().any(|r| r.code == DecisionCode::InvalidSpreadGeometry));
    }

    #[test]
    fn missing_expiry_blocks_candidate() {
        let card = passing_card(7);
        let out = evaluate_candidates(&[card], &healthy_contract(), &open_policy(), DecisionMode::Strict, false, &BTreeMap::new(), 100.0, 0.2);
        assert!(!out[0].keep);
        assert!(out[0].blocks.iter().any(|r| r.code == DecisionCode::MissingExpiryForBucket));
    }

    #[test]
    fn required_row_failure_blocks_in_strict_and_warns_in_probabilistic() {
        let mut strict_card = passing_card(7);
        strict_card.global_checklist.push(ChecklistItem {
            id: "delta".into(),
            name: "Delta in band".into(),
            status: ChecklistStatus::Fail,
            required: true,
            detail: "delta out of band".into(),
            reason: None,
            requires: vec![],
            data_ages: Default::default(),
            observed: None,
            thresholds: None,
        });
        let strict_out = evaluate_candidates(&[strict_card.clone()], &healthy_contract(), &open_policy(), DecisionMode::Strict, false, &dte_targets_with(7), 100.0, 0.2);
        assert!(!strict_out[0].keep);
        assert!(strict_out[0].blocks.iter().any(|r| r.code == DecisionCode::DeltaOutOfBand));

        let prob_out = evaluate_candidates(&[strict_card], &healthy_contract(), &open_policy(), DecisionMode::Probabilistic, false, &dte_targets_with(7), 100.0, 0.2);
        assert!(prob_out[0].keep);
        assert!(prob_out[0].soft_warnings.iter().any(|r| r.code == DecisionCode::DeltaOutOfBand));
    }

    #[test]
    fn disabled_bucket_blocks_in_strict_and_softens_in_probabilistic() {
        let card = passing_card(2);
        let mut policy = open_policy();
        policy.allowed_dte_buckets.remove(&2);

        let strict_out = evaluate_candidates(&[card.clone()], &healthy_contract(), &policy, DecisionMode::Strict, false, &dte_targets_with(2), 100.0, 0.2);
        assert!(!strict_out[0].keep);
        assert!(strict_out[0].blocks.iter().any(|r| r.code == DecisionCode::VolPolicyBucketDisabled));

        let prob_out = evaluate_candidates(&[card], &healthy_contract(), &policy, DecisionMode::Probabilistic, false, &dte_targets_with(2), 100.0, 0.2);
        assert!(prob_out[0].keep);
        assert!(prob_out[0].soft_warnings.iter().any(|r| r.code == DecisionCode::VolPolicyBucketDisabled));
    }

    #[test]
    fn zero_dte_rejected_when_feature_disabled() {
        let card = passing_card(0);
        let out = evaluate_candidates(&[card], &healthy_contract(), &open_policy(), DecisionMode::Strict, false, &dte_targets_with(0), 100.0, 0.2);
        assert!(!out[0].keep);
        assert!(out[0].blocks.iter().any(|r| r.code == DecisionCode::Feature0dteDisabled));
    }
}
