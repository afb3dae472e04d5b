//! Execution table mutators (§4.9 `close_trade`, `update_open_trade_marks_from_decision`).

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::snapshot::Snapshot;
use crate::types::{CandidateStatus, DecisionCode, ExecutionStatus, TradeCandidateRecord, TradeEventType, TradeExecutionRecord};

use super::events::{append_event, build_event};
use super::store::{load_json_or_default, save_json_atomic};

pub struct CloseOutcome {
    pub execution: TradeExecutionRecord,
    pub event_log_warning: Option<String>,
}

/// `close_trade` (§4.9). Preserves the documented (if debatable, see the
/// design notes) coupling: a non-losing close on a still-active candidate
/// marks that candidate `EXPIRED`.
#[tracing::instrument(skip(candidates_path, executions_path, events_path, notes), fields(trade_id))]
pub fn close_trade(
    candidates_path: &Path,
    executions_path: &Path,
    events_path: &Path,
    trade_id: &str,
    close_price: Option<f64>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<std::result::Result<CloseOutcome, DecisionCode>> {
    let mut executions: Vec<TradeExecutionRecord> = load_json_or_default(executions_path)?;
    let Some(execution) = executions.iter_mut().find(|e| e.trade_id == trade_id) else {
        return Ok(Err(DecisionCode::HardGatesNotMet));
    };
    if execution.status != ExecutionStatus::Open {
        return Ok(Err(DecisionCode::HardGatesNotMet));
    }

    let close = close_price.unwrap_or(execution.filled_credit);
    let realized_pnl = (execution.filled_credit - close) * 100.0 * f64::from(execution.quantity) - execution.fees_estimate;
    execution.close_price = Some(close);
    execution.closed_at = Some(now);
    execution.status = ExecutionStatus::Closed;
    execution.realized_pnl = Some(realized_pnl);
    execution.last_updated_at = now;
    // TradeExecutionRecord has no notes field; notes are absorbed by the
    // candidate record below if the realized-pnl coupling fires.
    let candidate_id = execution.candidate_id.clone();
    let execution_snapshot = execution.clone();

    save_json_atomic(executions_path, &executions)?;

    if realized_pnl >= 0.0 {
        let mut candidates: Vec<TradeCandidateRecord> = load_json_or_default(candidates_path)?;
        if let Some(candidate) = candidates.iter_mut().find(|c| c.candidate_id == candidate_id) {
            if !candidate.status.is_terminal() {
                candidate.status = CandidateStatus::Expired;
                candidate.updated_at = now;
                if notes.is_some() {
                    candidate.notes = notes;
                }
                save_json_atomic(candidates_path, &candidates)?;
            }
        }
    }

    let event = build_event(
        TradeEventType::PositionClosed,
        now,
        Some(execution_snapshot.candidate_id.clone()),
        Some(execution_snapshot.trade_id.clone()),
        Some(execution_snapshot.strategy.clone()),
        Some(execution_snapshot.dte_bucket),
        None,
    );
    let event_log_warning = append_event(events_path, &event).err().map(|e| format!("event log append failed: {e}"));

    Ok(Ok(CloseOutcome { execution: execution_snapshot, event_log_warning }))
}

/// `update_open_trade_marks_from_decision` (§4.9). Matches each OPEN
/// execution to the current recommendation for its `(direction, expiration,
/// short_strike, long_strike)` and reconciles mark-to-market fields. Open
/// trades are visited in storage (insertion) order so event-log output is
/// deterministic across re-runs of the same snapshot (§5).
#[tracing::instrument(skip(executions_path, events_path, snapshot))]
pub fn update_open_trade_marks_from_decision(
    executions_path: &Path,
    events_path: &Path,
    snapshot: &Snapshot,
    now: DateTime<Utc>,
) -> Result<(Vec<TradeExecutionRecord>, Option<String>)> {
    let mut executions: Vec<TradeExecutionRecord> = load_json_or_default(executions_path)?;
    let mut event_log_warning = None;
    let mut mutated = false;

    for execution in &mut executions {
        if execution.status != ExecutionStatus::Open {
            continue;
        }
        let Some(entry) = snapshot.dte_targets.get(&execution.dte_bucket) else { continue };
        let Some(card) = &entry.recommendation else { continue };
        if card.direction != execution.direction || entry.expiration != Some(execution.expiration) {
            continue;
        }
        let (short_strike, long_strike) = (execution.strikes.first().copied().unwrap_or(0.0), execution.strikes.get(1).copied().unwrap_or(0.0));
        let matches_strikes = card
            .legs
            .iter()
            .any(|l| (l.strike - short_strike).abs() < 1e-6)
            && card.legs.iter().any(|l| (l.strike - long_strike).abs() < 1e-6);
        if !matches_strikes {
            continue;
        }

        let mark = card.adjusted_premium;
        let qty = f64::from(execution.quantity);
        execution.current_mark = Some(mark);
        execution.unrealized_pnl = Some((execution.filled_credit - mark) * 100.0 * qty - execution.fees_estimate);
        execution.pnl_percent_of_risk = if execution.max_loss > 0.0 {
            Some(execution.unrealized_pnl.unwrap_or(0.0) / execution.max_loss)
        } else {
            None
        };
        execution.last_updated_at = now;
        mutated = true;

        let event = build_event(
            TradeEventType::PositionMarked,
            now,
            Some(execution.candidate_id.clone()),
            Some(execution.trade_id.clone()),
            Some(execution.strategy.clone()),
            Some(execution.dte_bucket),
            None,
        );
        if let Err(e) = append_event(events_path, &event) {
            event_log_warning = Some(format!("event log append failed: {e}"));
        }
    }

    if mutated {
        save_json_atomic(executions_path, &executions)?;
    }

    Ok((executions, event_log_warning))
}
