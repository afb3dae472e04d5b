//! Candidate table reconciliation (§4.9 `upsert_candidates_from_decision`,
//! `accept_candidate_as_trade`, `reject_candidate`).

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::ids::{candidate_id, trade_id};
use crate::types::snapshot::Snapshot;
use crate::types::{
    CandidateStatus, DecisionCode, ExecutionStatus, Reason, SpreadDirection, TradeCandidateRecord, TradeEventType,
    TradeExecutionRecord, UserDecision,
};

use super::events::{append_event, build_event};
use super::store::{load_json_or_default, save_json_atomic};

/// Outcome of a reconciliation pass. `event_log_warning` is set when the
/// primary table write succeeded but one or more event appends failed —
/// per §4.9 that failure must not roll back the table mutation.
pub struct UpsertOutcome {
    pub records: Vec<TradeCandidateRecord>,
    pub reasons: Vec<Reason>,
    pub event_log_warning: Option<String>,
}

fn direction_tag(direction: SpreadDirection) -> &'static str {
    match direction {
        SpreadDirection::BullPut => "BULL_PUT",
        SpreadDirection::BearCall => "BEAR_CALL",
    }
}

fn leg_strikes(card: &crate::types::CandidateCard) -> (f64, f64) {
    use crate::types::snapshot::LegAction;
    let short = card.legs.iter().find(|l| l.action == LegAction::Sell).map_or(0.0, |l| l.strike);
    let long = card.legs.iter().find(|l| l.action == LegAction::Buy).map_or(0.0, |l| l.strike);
    (short, long)
}

#[tracing::instrument(skip(candidates_path, events_path, snapshot))]
pub fn upsert_candidates_from_decision(
    candidates_path: &Path,
    events_path: &Path,
    snapshot: &Snapshot,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let mut records: Vec<TradeCandidateRecord> = load_json_or_default(candidates_path)?;
    let reasons = Vec::new();
    let mut pending_events = Vec::new();
    let mut current_ids = std::collections::HashSet::new();

    for (&dte_bucket, entry) in &snapshot.dte_targets {
        let (Some(card), Some(expiration)) = (&entry.recommendation, entry.expiration) else {
            continue;
        };
        let (short_strike, long_strike) = leg_strikes(card);
        let id = candidate_id(dte_bucket, direction_tag(card.direction), &expiration.format("%Y-%m-%d").to_string(), short_strike, long_strike, card.width);
        current_ids.insert(id.clone());

        if let Some(existing) = records.iter_mut().find(|r| r.candidate_id == id) {
            if !existing.status.is_terminal() && existing.status != CandidateStatus::Accepted && existing.status != CandidateStatus::Rejected {
                existing.updated_at = now;
                existing.short_strike = short_strike;
                existing.long_strike = long_strike;
                existing.width = card.width;
                existing.quoted_credit = card.credit;
                existing.spot_at_signal = snapshot.spot;
                existing.atm_iv_at_signal = snapshot.iv_atm;
            }
            continue;
        }

        let record = TradeCandidateRecord {
            candidate_id: id.clone(),
            created_at: now,
            updated_at: now,
            dte_bucket,
            direction: card.direction,
            expiration,
            short_strike,
            long_strike,
            width: card.width,
            quoted_credit: card.credit,
            mid_price_at_signal: None,
            spot_at_signal: snapshot.spot,
            atm_iv_at_signal: snapshot.iv_atm,
            em_1sd_at_signal: crate::volatility::expected_move_1sd(snapshot.spot, snapshot.iv_atm, f64::from(card.dte)),
            zscore_at_signal: None,
            mmc_stretch_at_signal: None,
            indicator_snapshot: serde_json::Value::Null,
            status: CandidateStatus::Generated,
            user_decision: None,
            notes: None,
        };
        pending_events.push(build_event(
            TradeEventType::CandidateCreated,
            now,
            Some(id.clone()),
            None,
            Some(card.strategy.clone()),
            Some(dte_bucket),
            None,
        ));
        records.push(record);
    }

    let today = now.date_naive();
    for record in &mut records {
        if record.status == CandidateStatus::Generated {
            if record.expiration < today {
                record.status = CandidateStatus::Expired;
            } else if !current_ids.contains(&record.candidate_id) {
                record.status = CandidateStatus::Invalidated;
            }
        }
    }

    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    save_json_atomic(candidates_path, &records)?;

    let mut event_log_warning = None;
    for event in &pending_events {
        if let Err(e) = append_event(events_path, event) {
            event_log_warning = Some(format!("event log append failed: {e}"));
        }
    }

    Ok(UpsertOutcome { records, reasons, event_log_warning })
}

#[derive(Debug, Clone)]
pub struct AcceptRequest {
    pub candidate_id: String,
    pub quantity: u32,
    pub filled_credit: Option<f64>,
    pub fees: Option<f64>,
    pub notes: Option<String>,
}

pub struct AcceptOutcome {
    pub execution: TradeExecutionRecord,
    pub event_log_warning: Option<String>,
}

/// `accept_candidate_as_trade` (§4.9). Fails with `HardGatesNotMet` if the
/// candidate is unknown; `InvalidSpreadGeometry` is reused to signal "an
/// OPEN execution already exists" since no dedicated code names that case.
#[tracing::instrument(skip(candidates_path, executions_path, events_path, req), fields(candidate_id = %req.candidate_id))]
pub fn accept_candidate_as_trade(
    candidates_path: &Path,
    executions_path: &Path,
    events_path: &Path,
    req: &AcceptRequest,
    now: DateTime<Utc>,
) -> Result<std::result::Result<AcceptOutcome, DecisionCode>> {
    let mut candidates: Vec<TradeCandidateRecord> = load_json_or_default(candidates_path)?;
    let mut executions: Vec<TradeExecutionRecord> = load_json_or_default(executions_path)?;

    let Some(candidate) = candidates.iter_mut().find(|c| c.candidate_id == req.candidate_id) else {
        return Ok(Err(DecisionCode::HardGatesNotMet));
    };

    if executions.iter().any(|e| e.candidate_id == req.candidate_id && e.status == ExecutionStatus::Open) {
        return Ok(Err(DecisionCode::InvalidSpreadGeometry));
    }

    let filled_credit = req.filled_credit.unwrap_or(candidate.quoted_credit);
    let fees = req.fees.unwrap_or(0.0);
    let qty = f64::from(req.quantity);
    let max_profit = filled_credit * 100.0 * qty;
    let max_loss = ((candidate.width - filled_credit) * 100.0 * qty).max(0.0);
    let break_even = match candidate.direction {
        SpreadDirection::BullPut => candidate.short_strike - filled_credit,
        SpreadDirection::BearCall => candidate.short_strike + filled_credit,
    };

    let execution = TradeExecutionRecord {
        trade_id: trade_id(now.timestamp_millis()),
        candidate_id: candidate.candidate_id.clone(),
        strategy: direction_tag(candidate.direction).to_string(),
        direction: candidate.direction,
        dte_bucket: candidate.dte_bucket,
        expiration: candidate.expiration,
        strikes: vec![candidate.short_strike, candidate.long_strike],
        width: candidate.width,
        opened_at: now,
        filled_credit,
        quantity: req.quantity,
        fees_estimate: fees,
        status: ExecutionStatus::Open,
        close_price: None,
        closed_at: None,
        realized_pnl: None,
        max_profit,
        max_loss,
        break_even,
        current_mark: Some(filled_credit),
        unrealized_pnl: Some(-fees),
        pnl_percent_of_risk: None,
        last_updated_at: now,
    };

    candidate.status = CandidateStatus::Accepted;
    candidate.user_decision = Some(UserDecision::Taken);
    candidate.updated_at = now;
    if req.notes.is_some() {
        candidate.notes = req.notes.clone();
    }

    executions.push(execution.clone());
    candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    save_json_atomic(candidates_path, &candidates)?;
    save_json_atomic(executions_path, &executions)?;

    let mut event_log_warning = None;
    let taken = build_event(
        TradeEventType::TradeTaken,
        now,
        Some(execution.candidate_id.clone()),
        Some(execution.trade_id.clone()),
        Some(execution.strategy.clone()),
        Some(execution.dte_bucket),
        None,
    );
    let opened = build_event(
        TradeEventType::PositionOpened,
        now,
        Some(execution.candidate_id.clone()),
        Some(execution.trade_id.clone()),
        Some(execution.strategy.clone()),
        Some(execution.dte_bucket),
        None,
    );
    for event in [&taken, &opened] {
        if let Err(e) = append_event(events_path, event) {
            event_log_warning = Some(format!("event log append failed: {e}"));
        }
    }

    Ok(Ok(AcceptOutcome { execution, event_log_warning }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectDecision {
    Skipped,
    Watchlist,
}

/// `reject_candidate` (§4.9).
#[tracing::instrument(skip(candidates_path, events_path, notes), fields(candidate_id))]
pub fn reject_candidate(
    candidates_path: &Path,
    events_path: &Path,
    candidate_id: &str,
    decision: RejectDecision,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<std::result::Result<Option<String>, DecisionCode>> {
    let mut candidates: Vec<TradeCandidateRecord> = load_json_or_default(candidates_path)?;
    let Some(candidate) = candidates.iter_mut().find(|c| c.candidate_id == candidate_id) else {
        return Ok(Err(DecisionCode::HardGatesNotMet));
    };

    candidate.user_decision = Some(match decision {
        RejectDecision::Skipped => UserDecision::Skipped,
        RejectDecision::Watchlist => UserDecision::Watchlist,
    });
    if decision == RejectDecision::Skipped {
        candidate.status = CandidateStatus::Rejected;
    }
    candidate.updated_at = now;
    if notes.is_some() {
        candidate.notes = notes;
    }
    let strategy = None;
    let dte_bucket = Some(candidate.dte_bucket);

    candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    save_json_atomic(candidates_path, &candidates)?;

    let event = build_event(TradeEventType::TradeSkipped, now, Some(candidate_id.to_string()), None, strategy, dte_bucket, None);
    let warning = append_event(events_path, &event).err().map(|e| format!("event log append failed: {e}"));

    Ok(Ok(warning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::candidate::{CandidateCard, CandidateMetrics};
    use crate::types::snapshot::{DteTargetEntry, FeedTable, LegAction, OptionKind, OptionLeg, SessionState};
    use chrono::TimeZone;

    fn leg(action: LegAction, kind: OptionKind, strike: f64) -> OptionLeg {
        OptionLeg { action, kind, strike, delta: -0.1, gamma: Some(0.05), premium: None, qty: None, implied_vol: None }
    }

    fn card() -> CandidateCard {
        CandidateCard {
            candidate_id: String::new(),
            strategy: "BULL_PUT".into(),
            ready: true,
            width: 10.0,
            credit: 2.0,
            adjusted_premium: 2.0,
            legs: vec![
                leg(LegAction::Sell, OptionKind::Put, 4950.0),
                leg(LegAction::Buy, OptionKind::Put, 4940.0),
            ],
            direction: SpreadDirection::BullPut,
            dte: 7,
            bid_ask_spread: None,
            global_checklist: vec![],
            regime_checklist: vec![],
            strategy_checklist: vec![],
            hard_block_code: None,
            metrics: CandidateMetrics::default(),
        }
    }

    fn snapshot_with_one_candidate(expiration: chrono::NaiveDate) -> Snapshot {
        let mut dte_targets = std::collections::BTreeMap::new();
        dte_targets.insert(7, DteTargetEntry { selected_dte: Some(7), expiration: Some(expiration), recommendation: Some(card()) });
        Snapshot {
            as_of: Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap(),
            session: SessionState::Open,
            source: "live".into(),
            spot: 5000.0,
            iv_atm: 0.18,
            iv_term: std::collections::BTreeMap::new(),
            realized_vol: Some(0.15),
            vix: 15.0,
            prev_vix: 14.8,
            prev_spot: 4995.0,
            candles: vec![],
            feeds: FeedTable::default(),
            regime: None,
            candidates: vec![],
            dte_targets,
        }
    }

    #[test]
    fn upsert_creates_new_generated_candidate_and_event() {
        let dir = tempfile::tempdir().unwrap();
        let candidates_path = dir.path().join("candidates.json");
        let events_path = dir.path().join("events.jsonl");
        let snapshot = snapshot_with_one_candidate(chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();

        let outcome = upsert_candidates_from_decision(&candidates_path, &events_path, &snapshot, now).unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].status, CandidateStatus::Generated);
        assert!(outcome.event_log_warning.is_none());

        let events: Vec<crate::types::TradeEventRecord> = super::super::store::read_jsonl(&events_path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, TradeEventType::CandidateCreated);
    }

    #[test]
    fn upsert_invalidates_generated_candidate_missing_from_current_set() {
        let dir = tempfile::tempdir().unwrap();
        let candidates_path = dir.path().join("candidates.json");
        let events_path = dir.path().join("events.jsonl");
        let expiration = chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap();
        let snapshot = snapshot_with_one_candidate(expiration);
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        upsert_candidates_from_decision(&candidates_path, &events_path, &snapshot, now).unwrap();

        let mut empty_snapshot = snapshot;
        empty_snapshot.dte_targets.clear();
        let outcome = upsert_candidates_from_decision(&candidates_path, &events_path, &empty_snapshot, now).unwrap();
        assert_eq!(outcome.records[0].status, CandidateStatus::Invalidated);
    }

    #[test]
    fn upsert_expires_generated_candidate_past_expiration() {
        let dir = tempfile::tempdir().unwrap();
        let candidates_path = dir.path().join("candidates.json");
        let events_path = dir.path().join("events.jsonl");
        let past_expiration = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let snapshot = snapshot_with_one_candidate(past_expiration);
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();

        let outcome = upsert_candidates_from_decision(&candidates_path, &events_path, &snapshot, now).unwrap();
        assert_eq!(outcome.records[0].status, CandidateStatus::Expired);
    }

    #[test]
    fn accept_candidate_as_trade_creates_open_execution() {
        let dir = tempfile::tempdir().unwrap();
        let candidates_path = dir.path().join("candidates.json");
        let executions_path = dir.path().join("executions.json");
        let events_path = dir.path().join("events.jsonl");
        let snapshot = snapshot_with_one_candidate(chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let upsert = upsert_candidates_from_decision(&candidates_path, &events_path, &snapshot, now).unwrap();
        let id = upsert.records[0].candidate_id.clone();

        let req = AcceptRequest { candidate_id: id.clone(), quantity: 1, filled_credit: Some(2.0), fees: Some(1.3), notes: None };
        let outcome = accept_candidate_as_trade(&candidates_path, &executions_path, &events_path, &req, now).unwrap().unwrap();
        assert_eq!(outcome.execution.status, ExecutionStatus::Open);
        assert!((outcome.execution.unrealized_pnl.unwrap() + 1.3).abs() < 1e-9);

        let candidates: Vec<TradeCandidateRecord> = load_json_or_default(&candidates_path).unwrap();
        assert_eq!(candidates[0].status, CandidateStatus::Accepted);
    }

    #[test]
    fn accept_candidate_rejects_duplicate_open_execution() {
        let dir = tempfile::tempdir().unwrap();
        let candidates_path = dir.path().join("candidates.json");
        let executions_path = dir.path().join("executions.json");
        let events_path = dir.path().join("events.jsonl");
        let snapshot = snapshot_with_one_candidate(chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let upsert = upsert_candidates_from_decision(&candidates_path, &events_path, &snapshot, now).unwrap();
        let id = upsert.records[0].candidate_id.clone();

        let req = AcceptRequest { candidate_id: id, quantity: 1, filled_credit: None, fees: None, notes: None };
        accept_candidate_as_trade(&candidates_path, &executions_path, &events_path, &req, now).unwrap().unwrap();
        let second = accept_candidate_as_trade(&candidates_path, &executions_path, &events_path, &req, now).unwrap();
        assert_eq!(second.unwrap_err(), DecisionCode::InvalidSpreadGeometry);
    }

    #[test]
    fn reject_candidate_skipped_sets_terminal_status() {
        let dir = tempfile::tempdir().unwrap();
        let candidates_path = dir.path().join("candidates.json");
        let events_path = dir.path().join("events.jsonl");
        let snapshot = snapshot_with_one_candidate(chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let upsert = upsert_candidates_from_decision(&candidates_path, &events_path, &snapshot, now).unwrap();
        let id = upsert.records[0].candidate_id.clone();

        reject_candidate(&candidates_path, &events_path, &id, RejectDecision::Skipped, None, now).unwrap().unwrap();
        let candidates: Vec<TradeCandidateRecord> = load_json_or_default(&candidates_path).unwrap();
        assert_eq!(candidates[0].status, CandidateStatus::Rejected);
    }

    #[test]
    fn upsert_keeps_table_sorted_by_updated_at_descending() {
        let dir = tempfile::tempdir().unwrap();
        let candidates_path = dir.path().join("candidates.json");
        let events_path = dir.path().join("events.jsonl");
        let expiration = chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();

        let first = upsert_candidates_from_decision(&candidates_path, &events_path, &snapshot_with_one_candidate(expiration), t1).unwrap();
        let first_id = first.records[0].candidate_id.clone();
        reject_candidate(&candidates_path, &events_path, &first_id, RejectDecision::Skipped, None, t1).unwrap().unwrap();

        let t2 = t1 + chrono::Duration::minutes(10);
        let mut second_snapshot = snapshot_with_one_candidate(expiration);
        second_snapshot.dte_targets.insert(14, DteTargetEntry { selected_dte: Some(14), expiration: Some(expiration), recommendation: Some(card()) });
        let outcome = upsert_candidates_from_decision(&candidates_path, &events_path, &second_snapshot, t2).unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.records.windows(2).all(|w| w[0].updated_at >= w[1].updated_at));
        assert_eq!(outcome.records[0].updated_at, t2);
    }

    #[test]
    fn reject_candidate_watchlist_keeps_generated_status() {
        let dir = tempfile::tempdir().unwrap();
        let candidates_path = dir.path().join("candidates.json");
        let events_path = dir.path().join("events.jsonl");
        let snapshot = snapshot_with_one_candidate(chrono::NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        let upsert = upsert_candidates_from_decision(&candidates_path, &events_path, &snapshot, now).unwrap();
        let id = upsert.records[0].candidate_id.clone();

        reject_candidate(&candidates_path, &events_path, &id, RejectDecision::Watchlist, None, now).unwrap().unwrap();
        let candidates: Vec<TradeCandidateRecord> = load_json_or_default(&candidates_path).unwrap();
        assert_eq!(candidates[0].status, CandidateStatus::Generated);
        assert_eq!(candidates[0].user_decision, Some(UserDecision::Watchlist));
    }
}
