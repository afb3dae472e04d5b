//! Adaptive polling controller (§4.8): derives the next tick interval from
//! open-trade danger, candidate DTE mix, MMC recency, and volatility regime.

use chrono::{DateTime, Utc};

use crate::types::VolRegime;

#[derive(Debug, Clone, Copy)]
pub struct OpenTradeState {
    pub dte: u32,
    pub spot: f64,
    pub short_strike: f64,
    pub em_1sd: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct MmcEvent {
    pub dte_bucket: u32,
    pub triggered_at: DateTime<Utc>,
}

pub struct PollingState<'a> {
    pub open_trades: &'a [OpenTradeState],
    pub candidate_dtes: &'a [u32],
    pub mmc_events: &'a [MmcEvent],
    pub vol_regime: VolRegime,
    pub shock_flag: bool,
}

fn baseline_for_dte(dte: u32) -> u32 {
    match dte {
        45 => 60,
        30 => 60,
        14 => 30,
        7 => 15,
        2 => 10,
        _ => 60,
    }
}

fn danger_ratio_interval(danger_ratio: f64) -> u32 {
    if danger_ratio <= 0.5 {
        5
    } else if danger_ratio <= 0.75 {
        10
    } else {
        15
    }
}

/// `compute_polling_interval` (§4.8). Monotonically tightens a baseline by
/// taking the minimum over every applicable cap; never widens past a cap
/// already applied by an earlier rule.
pub fn compute_polling_interval(state: &PollingState, now: DateTime<Utc>) -> u32 {
    if state.open_trades.is_empty() && state.candidate_dtes.is_empty() {
        return 120;
    }

    let all_dtes = state.open_trades.iter().map(|t| t.dte).chain(state.candidate_dtes.iter().copied());
    let mut interval = all_dtes.map(baseline_for_dte).min().unwrap_or(60);

    for trade in state.open_trades {
        if trade.dte <= 2 {
            interval = interval.min(10);
        } else if trade.dte <= 7 {
            interval = interval.min(15);
        }

        let danger_ratio = if trade.em_1sd > 0.0 { (trade.spot - trade.short_strike).abs() / trade.em_1sd } else { 0.0 };
        interval = interval.min(danger_ratio_interval(danger_ratio));
    }

    let recent_mmc = state.mmc_events.iter().any(|e| (now - e.triggered_at).num_minutes() < 20);
    if recent_mmc {
        interval = interval.min(15);
    }

    if state.shock_flag {
        interval = interval.min(10);
    }
    if matches!(state.vol_regime, VolRegime::VolExpanding | VolRegime::VolExtreme) {
        interval = interval.min(15);
    }
    if state.vol_regime == VolRegime::VolSuppressed && state.open_trades.is_empty() && state.candidate_dtes.iter().all(|&d| d >= 14) {
        interval = interval.max(45);
    }

    interval.clamp(5, 120)
}

/// A checklist row has "passed" an MMC gate when its status reads `Pass`;
/// this module is intentionally agnostic to the exact checklist-row shape,
/// taking bare `(dte_bucket, passed)` pairs for the previous and current
/// tick so it composes with whatever upstream row format is in play.
pub fn merge_mmc_events(
    prev_events: &[MmcEvent],
    prev_pass: &[(u32, bool)],
    current_pass: &[(u32, bool)],
    now: DateTime<Utc>,
) -> Vec<MmcEvent> {
    let mut events: Vec<MmcEvent> = prev_events.iter().copied().filter(|e| (now - e.triggered_at).num_minutes() < 20).collect();

    for &(bucket, passed) in current_pass {
        if !passed {
            continue;
        }
        let was_passing_before = prev_pass.iter().any(|&(b, p)| b == bucket && p);
        if !was_passing_before {
            events.push(MmcEvent { dte_bucket: bucket, triggered_at: now });
        }
    }

    events
}
