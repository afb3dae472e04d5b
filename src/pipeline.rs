//! The decision pipeline (§4.7): the fixed eight-stage orchestrator that
//! turns one `Snapshot` into one `DecisionOutput`. Pure with respect to its
//! snapshot argument save for the IV-cache read/write it performs before
//! classification, per the ordering guarantee in §5.

use chrono::{DateTime, Utc};

use crate::candidates::evaluate_candidates;
use crate::config::{DecisionMode, EngineConfig};
use crate::dte::resolve_nearest_dte_buckets;
use crate::error::Result;
use crate::freshness::{evaluate_data_contract, ContractStatus, EvaluateOptions};
use crate::ids::run_id;
use crate::rank::rank_candidates;
use crate::session::{resolve_data_mode, DataMode, DataModeInputs};
use crate::types::candidate::DataKey;
use crate::types::decision::{DecisionDebug, DteBucketResolution};
use crate::types::snapshot::{SessionState, Snapshot};
use crate::types::{DecisionCode, DecisionOutput, DecisionStatus, IvSample, Reason, StageResult, StageStatus};
use crate::volatility::{apply_vol_policy, cache, classify_vol_regime, detect_vol_shock, expected_move_1sd, ClassifyInputs};

const IV_CACHE_MAX_SAMPLES: usize = 500;

struct PipelineState {
    blocks: Vec<Reason>,
    warnings: Vec<Reason>,
    stages: Vec<StageResult>,
    preflight_blocked: bool,
    preflight_degraded: bool,
}

impl PipelineState {
    fn new() -> Self {
        Self { blocks: Vec::new(), warnings: Vec::new(), stages: Vec::new(), preflight_blocked: false, preflight_degraded: false }
    }
}

fn stage_with_reasons(name: &str, blocks: &[Reason], warnings: &[Reason], status_if_blocked: StageStatus) -> StageResult {
    let status = if blocks.is_empty() { StageStatus::Pass } else { status_if_blocked };
    let reasons = blocks.iter().chain(warnings.iter()).cloned().collect();
    StageResult { stage_name: name.to_string(), status, reasons, details: None }
}

/// §4.7 stage 1. Returns the resolved data contract alongside whatever
/// `Reason`s the preflight stage produced (some land in blocks, some in
/// warnings, decided by live/strict-mode escalation).
fn run_preflight(
    snapshot: &Snapshot,
    config: &EngineConfig,
    data_mode: DataMode,
    now: DateTime<Utc>,
    state: &mut PipelineState,
) -> crate::freshness::DataContract {
    let mut stage_blocks = Vec::new();
    let mut stage_warnings = Vec::new();

    if snapshot.session == SessionState::Closed && !config.simulation_mode {
        stage_blocks.push(Reason::new(DecisionCode::MarketClosed, "market session is closed"));
    }
    if config.simulation_mode {
        stage_warnings.push(Reason::new(DecisionCode::SimulationActive, "simulation mode is active"));
    }

    let contract = evaluate_data_contract(&snapshot.feeds, snapshot.session, now, &EvaluateOptions { allow_closed_evaluation: config.simulation_mode });

    let strict_live = data_mode == DataMode::Live && snapshot.session == SessionState::Open && !config.simulation_mode && config.strict_live_blocks;

    for (key, plain_code, strict_code, label) in [
        (DataKey::UnderlyingPrice, DecisionCode::SpotStale, DecisionCode::DataStaleSpot, "spot"),
        (DataKey::OptionChain, DecisionCode::ChainStale, DecisionCode::DataStaleChain, "option chain"),
        (DataKey::Greeks, DecisionCode::GreeksStale, DecisionCode::DataStaleGreeks, "greeks"),
    ] {
        let Some(feed) = contract.feed(key) else { continue };
        if feed.is_valid {
            continue;
        }
        let message = format!("{label} feed is stale or missing");
        if strict_live {
            stage_blocks.push(Reason::new(strict_code, message));
        } else {
            stage_warnings.push(Reason::new(plain_code, message));
        }
    }

    state.preflight_blocked = !stage_blocks.is_empty();
    state.preflight_degraded = contract.status == ContractStatus::Degraded && stage_blocks.is_empty();

    state.stages.push(stage_with_reasons("preflight", &stage_blocks, &stage_warnings, StageStatus::Block));
    state.blocks.extend(stage_blocks);
    state.warnings.extend(stage_warnings);
    contract
}

/// §4.7 stage 2. Records the current IV reading before classification (§5
/// ordering guarantee 1), then runs the classifier and policy overlay.
fn run_volatility_stage(
    snapshot: &Snapshot,
    config: &EngineConfig,
    data_mode: DataMode,
    now: DateTime<Utc>,
    state: &mut PipelineState,
) -> (crate::types::VolSummary, Vec<IvSample>) {
    let sample = IvSample { ts_iso: snapshot.as_of.to_rfc3339(), iv_atm: snapshot.iv_atm };
    let samples = cache::record(&config.storage.iv_cache_path, sample, now, config.volatility.lookback_days, IV_CACHE_MAX_SAMPLES).unwrap_or_default();

    let iv_age_ms = snapshot.feeds.underlying_price.age_ms(now).unwrap_or(0);
    let classify_inputs = ClassifyInputs {
        iv_atm_raw: Some(snapshot.iv_atm),
        iv_atm_age_ms: iv_age_ms,
        realized_vol: snapshot.realized_vol,
        realized_range_15m: snapshot.feeds.realized_range_15m.value,
        iv_term: &snapshot.iv_term,
        samples: &samples,
        as_of: snapshot.as_of,
    };
    let classify_outcome = classify_vol_regime(&classify_inputs, &config.volatility);
    let policy = apply_vol_policy(classify_outcome.regime, &config.volatility);

    let em_1sd = expected_move_1sd(snapshot.spot, snapshot.iv_atm, 1.0);
    let shock = detect_vol_shock(snapshot.spot, snapshot.prev_spot, em_1sd, snapshot.vix, snapshot.prev_vix, &config.volatility);

    let mut stage_blocks = Vec::new();
    let mut stage_warnings = classify_outcome.warnings.clone();

    let strict_live = data_mode == DataMode::Live && snapshot.session == SessionState::Open && !config.simulation_mode;
    if shock.triggered {
        let reason = Reason::new(
            if shock.severity == crate::types::ShockSeverity::Block { DecisionCode::VolShock } else { DecisionCode::VolShockWarn },
            "volatility shock detected",
        )
        .with_details(serde_json::json!({"move_pct_em_1sd": shock.move_pct_em_1sd, "vix_delta": shock.vix_delta}));
        if shock.severity == crate::types::ShockSeverity::Block && strict_live {
            stage_blocks.push(reason);
        } else {
            stage_warnings.push(reason);
        }
    }

    state.stages.push(stage_with_reasons("volatility_regime", &stage_blocks, &stage_warnings, StageStatus::Block));
    state.blocks.extend(stage_blocks);
    state.warnings.extend(stage_warnings.clone());

    let summary = crate::types::VolSummary {
        regime: classify_outcome.regime,
        confidence: classify_outcome.confidence,
        features: classify_outcome.features,
        shock,
        policy,
    };
    (summary, samples)
}

fn run_dte_stage(snapshot: &Snapshot, state: &mut PipelineState) -> Vec<DteBucketResolution> {
    let available_dtes: Vec<u32> = snapshot.candidates.iter().map(|c| c.dte).collect();
    let resolutions = resolve_nearest_dte_buckets(&available_dtes);

    let mut stage_warnings = Vec::new();
    let bucket_resolutions: Vec<DteBucketResolution> = resolutions
        .into_iter()
        .map(|r| {
            let expiration = snapshot.dte_targets.get(&r.target).and_then(|e| e.expiration).map(|d| d.format("%Y-%m-%d").to_string());
            if expiration.is_none() {
                stage_warnings.push(
                    Reason::new(DecisionCode::MissingExpiryForBucket, "no expiration resolved for this DTE target")
                        .with_details(serde_json::json!({"target": r.target})),
                );
            }
            DteBucketResolution { target: r.target, selected: r.selected, distance: r.distance, expiration }
        })
        .collect();

    state.stages.push(stage_with_reasons("dte_bucket_resolver", &[], &stage_warnings, StageStatus::Block));
    state.warnings.extend(stage_warnings);
    bucket_resolutions
}

fn run_regime_stage(snapshot: &Snapshot, mode: DecisionMode, state: &mut PipelineState) {
    if snapshot.regime.is_some() {
        state.stages.push(StageResult::pass("regime_classifier"));
        return;
    }
    let reason = Reason::new(DecisionCode::RegimeUnclassified, "upstream regime label is absent");
    match mode {
        DecisionMode::Strict => {
            state.blocks.push(reason.clone());
            state.stages.push(stage_with_reasons("regime_classifier", &[reason], &[], StageStatus::Block));
        }
        DecisionMode::Probabilistic => {
            state.warnings.push(reason.clone());
            state.stages.push(stage_with_reasons("regime_classifier", &[], &[reason], StageStatus::Block));
        }
    }
}

/// The full pipeline entry point. `now` is threaded in explicitly (rather
/// than read from the clock here) so the pipeline stays pure and testable.
#[tracing::instrument(skip(snapshot, config), fields(source = %snapshot.source))]
pub fn evaluate(snapshot: &Snapshot, config: &EngineConfig, now: DateTime<Utc>) -> Result<DecisionOutput> {
    let mut state = PipelineState::new();

    let core_feeds_fresh = [&snapshot.feeds.underlying_price.ts, &snapshot.feeds.option_chain.ts, &snapshot.feeds.greeks.ts]
        .iter()
        .all(|ts| ts.is_some_and(|t| (now - t).num_seconds() <= 20));
    let data_mode = resolve_data_mode(&DataModeInputs {
        source_tag: &snapshot.source,
        session: snapshot.session,
        simulation_mode: config.simulation_mode,
        core_feeds_fresh,
    });

    let contract = run_preflight(snapshot, config, data_mode, now, &mut state);
    let (vol, _iv_samples) = run_volatility_stage(snapshot, config, data_mode, now, &mut state);
    let dte_buckets = run_dte_stage(snapshot, &mut state);
    run_regime_stage(snapshot, config.decision_mode, &mut state);

    let evaluations = evaluate_candidates(
        &snapshot.candidates,
        &contract,
        &vol.policy,
        config.decision_mode,
        config.feature_0dte,
        &snapshot.dte_targets,
        snapshot.spot,
        snapshot.iv_atm,
    );

    let mut soft_warnings = Vec::new();
    let mut candidate_blocks = Vec::new();
    let mut cards = Vec::new();
    let mut keepers = Vec::new();
    for evaluation in evaluations {
        soft_warnings.extend(evaluation.soft_warnings);
        candidate_blocks.extend(evaluation.blocks);
        if evaluation.keep {
            keepers.push(evaluation.card.clone());
        }
        cards.push(evaluation.card);
    }
    state.stages.push(stage_with_reasons("candidate_generator", &candidate_blocks, &[], StageStatus::Block));
    state.blocks.extend(candidate_blocks);
    state.stages.push(stage_with_reasons("soft_warnings", &[], &soft_warnings, StageStatus::Block));
    state.warnings.extend(soft_warnings);

    let ranked = rank_candidates(&keepers, config.prob_max_gamma_penalty);

    let ranker_stage = if ranked.is_empty() {
        let reason = Reason::new(DecisionCode::NoCreditSpreadCandidate, "no candidate survived filtering");
        state.warnings.push(reason.clone());
        StageResult { stage_name: "deterministic_ranker".into(), status: StageStatus::NoCandidate, reasons: vec![reason], details: None }
    } else {
        StageResult::pass("deterministic_ranker")
    };
    state.stages.push(ranker_stage);

    let mut alert_warnings = Vec::new();
    if config.simulation_mode && !config.allow_sim_alerts {
        alert_warnings.push(Reason::new(DecisionCode::AlertsSuppressedSimulation, "alerts suppressed while in simulation mode"));
    }
    state.stages.push(stage_with_reasons("alert_policy", &[], &alert_warnings, StageStatus::Block));
    state.warnings.extend(alert_warnings);

    let status = if state.preflight_blocked || !state.blocks.is_empty() {
        DecisionStatus::Blocked
    } else if !ranked.is_empty() {
        DecisionStatus::Ready
    } else if state.preflight_degraded {
        DecisionStatus::Degraded
    } else {
        DecisionStatus::NoCandidate
    };

    let primary_candidate_id = ranked.first().map(|r| r.candidate_id.clone());
    let run_identifier = run_id(&snapshot.as_of.to_rfc3339(), &snapshot.source, data_mode_label(data_mode), session_label(snapshot.session), cards.len());

    for reason in state.blocks.iter().chain(state.warnings.iter()) {
        tracing::warn!(run_id = %run_identifier, code = ?reason.code, message = %reason.message, "decision reason");
    }
    tracing::info!(run_id = %run_identifier, status = ?status, candidate_count = cards.len(), ranked_count = ranked.len(), "decision evaluated");

    Ok(DecisionOutput {
        status,
        decision_mode: config.decision_mode,
        blocks: state.blocks,
        warnings: state.warnings,
        vol,
        candidates: cards,
        ranked,
        primary_candidate_id,
        dte_buckets,
        debug: DecisionDebug { run_id: run_identifier, stages: state.stages },
    })
}

fn data_mode_label(mode: DataMode) -> &'static str {
    match mode {
        DataMode::Live => "LIVE",
        DataMode::Delayed => "DELAYED",
        DataMode::Historical => "HISTORICAL",
        DataMode::Fixture => "FIXTURE",
    }
}

fn session_label(session: SessionState) -> &'static str {
    match session {
        SessionState::Open => "OPEN",
        SessionState::Closed => "CLOSED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::candidate::{CandidateCard, CandidateMetrics};
    use crate::types::snapshot::{FeedSample, FeedTable, LegAction, OptionKind, OptionLeg, Regime};
    use crate::types::SpreadDirection;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn leg(action: LegAction, kind: OptionKind, strike: f64, delta: f64) -> OptionLeg {
        OptionLeg { action, kind, strike, delta, gamma: Some(0.03), premium: None, qty: None, implied_vol: None }
    }

    fn bull_put_card(dte: u32) -> CandidateCard {
        CandidateCard {
            candidate_id: format!("cand_{dte}"),
            strategy: "BULL_PUT".into(),
            ready: true,
            width: 10.0,
            credit: 2.0,
            adjusted_premium: 2.0,
            legs: vec![leg(LegAction::Sell, OptionKind::Put, 4950.0, -0.1), leg(LegAction::Buy, OptionKind::Put, 4940.0, -0.05)],
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

    fn healthy_snapshot(now: DateTime<Utc>) -> Snapshot {
        let mut dte_targets = BTreeMap::new();
        dte_targets.insert(
            7,
            crate::types::snapshot::DteTargetEntry {
                selected_dte: Some(7),
                expiration: Some(chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap()),
                recommendation: Some(bull_put_card(7)),
            },
        );
        let fresh = |v: f64| FeedSample { value: Some(v), ts: Some(now), source: Some("tastytrade-live".into()), error: None };
        Snapshot {
            as_of: now,
            session: SessionState::Open,
            source: "tastytrade-live".into(),
            spot: 5000.0,
            iv_atm: 0.18,
            iv_term: BTreeMap::new(),
            realized_vol: Some(0.16),
            vix: 15.0,
            prev_vix: 14.9,
            prev_spot: 4998.0,
            candles: vec![],
            feeds: FeedTable {
                underlying_price: fresh(5000.0),
                option_chain: FeedSample { value: Some(serde_json::json!({})), ts: Some(now), source: Some("tastytrade-live".into()), error: None },
                greeks: FeedSample { value: Some(serde_json::json!({})), ts: Some(now), source: Some("tastytrade-live".into()), error: None },
                intraday_candles: FeedSample { value: Some(vec![]), ts: Some(now), source: Some("tastytrade-live".into()), error: None },
                vwap: fresh(5000.0),
                atr_1m_5: fresh(3.0),
                realized_range_15m: fresh(2.0),
                expected_move: fresh(40.0),
                regime: FeedSample { value: Some(Regime::Chop), ts: Some(now), source: Some("tastytrade-live".into()), error: None },
            },
            regime: Some(Regime::Chop),
            candidates: vec![bull_put_card(7)],
            dte_targets,
        }
    }

    #[test]
    fn closed_market_without_simulation_blocks() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let mut snapshot = healthy_snapshot(now);
        snapshot.session = SessionState::Closed;
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.iv_cache_path = dir.path().join("iv.json");

        let decision = evaluate(&snapshot, &config, now).unwrap();
        assert_eq!(decision.status, DecisionStatus::Blocked);
        assert!(decision.has_code(DecisionCode::MarketClosed));
    }

    #[test]
    fn fresh_snapshot_with_valid_candidate_is_ready() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let snapshot = healthy_snapshot(now);
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.iv_cache_path = dir.path().join("iv.json");

        // Seed a mid-range IV history so today's 0.18 reading lands near the
        // 50th percentile instead of the 100th (a single-sample cache would
        // otherwise read as VOL_EXTREME and disallow the 7-DTE bucket).
        for (day, iv) in [(1, 0.05), (2, 0.10), (3, 0.15), (4, 0.20), (5, 0.25), (6, 0.30)] {
            let ts = Utc.with_ymd_and_hms(2026, 5, day, 12, 0, 0).unwrap();
            crate::volatility::cache::record(&config.storage.iv_cache_path, crate::types::IvSample { ts_iso: ts.to_rfc3339(), iv_atm: iv }, now, 60, 500).unwrap();
        }

        let decision = evaluate(&snapshot, &config, now).unwrap();
        assert_eq!(decision.status, DecisionStatus::Ready);
        assert!(decision.primary_candidate_id.is_some());
        assert!(!decision.ranked.is_empty());
    }

    #[test]
    fn missing_regime_blocks_in_strict_mode() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let mut snapshot = healthy_snapshot(now);
        snapshot.regime = None;
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.iv_cache_path = dir.path().join("iv.json");

        let decision = evaluate(&snapshot, &config, now).unwrap();
        assert_eq!(decision.status, DecisionStatus::Blocked);
        assert!(decision.has_code(DecisionCode::RegimeUnclassified));
    }

    #[test]
    fn no_candidates_yields_no_candidate_status() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let mut snapshot = healthy_snapshot(now);
        snapshot.candidates.clear();
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.iv_cache_path = dir.path().join("iv.json");

        let decision = evaluate(&snapshot, &config, now).unwrap();
        assert_eq!(decision.status, DecisionStatus::NoCandidate);
        assert!(decision.has_code(DecisionCode::NoCreditSpreadCandidate));
    }
}
