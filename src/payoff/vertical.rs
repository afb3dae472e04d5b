use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::decision::DecisionCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadSide {
    PutCredit,
    CallCredit,
    PutDebit,
    CallDebit,
}

impl SpreadSide {
    fn is_credit(self) -> bool {
        matches!(self, SpreadSide::PutCredit | SpreadSide::CallCredit)
    }

    fn is_put(self) -> bool {
        matches!(self, SpreadSide::PutCredit | SpreadSide::PutDebit)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct PayoffResult {
    pub max_profit: f64,
    pub max_loss: f64,
    pub ror: Option<f64>,
    pub breakeven: f64,
    pub credit_pct: f64,
    pub width: f64,
}

/// Closed-form vertical-spread payoff (§4.1). `premium` is the credit
/// received for a credit spread, or the debit paid for a debit spread — the
/// spec names this parameter `credit` regardless of side.
pub fn compute_vertical_payoff(
    side: SpreadSide,
    short: f64,
    long: f64,
    premium: f64,
    contracts: u32,
    multiplier: f64,
) -> Result<PayoffResult, DecisionCode> {
    let width = (short - long).abs();
    let finite = short.is_finite() && long.is_finite() && premium.is_finite() && multiplier.is_finite();
    if !finite || width <= 0.0 || premium >= width || premium <= 0.0 {
        return Err(DecisionCode::InvalidSpreadGeometry);
    }

    let contracts = f64::from(contracts);
    let (max_profit, max_loss) = if side.is_credit() {
        (premium * multiplier * contracts, (width - premium) * multiplier * contracts)
    } else {
        ((width - premium) * multiplier * contracts, premium * multiplier * contracts)
    };

    let ror = if max_loss > 0.0 { Some(max_profit / max_loss) } else { None };

    let breakeven = match (side, side.is_put()) {
        (SpreadSide::PutCredit, true) => short - premium,
        (SpreadSide::CallCredit, false) => short + premium,
        (SpreadSide::PutDebit, true) => short - premium,
        (SpreadSide::CallDebit, false) => short + premium,
        _ => unreachable!("side.is_put() is derived from side"),
    };

    Ok(PayoffResult {
        max_profit,
        max_loss,
        ror,
        breakeven,
        credit_pct: premium / width,
        width,
    })
}

/// Piecewise-linear expiration value of a vertical spread, clamped by width
/// (§4.1, testable property 1). `short`/`long` are the two strikes in
/// whichever order the side implies; the payoff is expressed per-contract,
/// pre-multiplier, so callers scale by `multiplier * contracts` themselves.
pub fn expiration_pnl(side: SpreadSide, short: f64, long: f64, premium: f64, underlying: f64) -> f64 {
    let width = (short - long).abs();
    let is_put = side.is_put();

    // Value of the short leg's obligation net of the long leg's protection,
    // i.e. what the spread is worth at expiration from the short side's
    // point of view. Monotonic and bounded to [0, width] by construction.
    let spread_value = if is_put {
        (short - underlying).max(0.0) - (long - underlying).max(0.0)
    } else {
        (underlying - short).max(0.0) - (underlying - long).max(0.0)
    }
    .clamp(0.0, width);

    if side.is_credit() {
        premium - spread_value
    } else {
        spread_value - premium
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct PayoffPoint {
    pub x: f64,
    pub y: f64,
}

/// Samples 120 `(x, y)` pairs across `spot * [1 - pct, 1 + pct]` (§4.1).
pub fn build_expiration_payoff_curve(
    side: SpreadSide,
    short: f64,
    long: f64,
    premium: f64,
    spot: f64,
    range_pct: f64,
) -> Vec<PayoffPoint> {
    const POINTS: usize = 120;
    let pct = range_pct.clamp(0.02, 0.5);
    let lo = spot * (1.0 - pct);
    let hi = spot * (1.0 + pct);
    let step = (hi - lo) / (POINTS - 1) as f64;
    (0..POINTS)
        .map(|i| {
            let x = lo + step * i as f64;
            PayoffPoint {
                x,
                y: expiration_pnl(side, short, long, premium, x),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_vertical_payoff_matches_scenario() {
        let result = compute_vertical_payoff(SpreadSide::PutCredit, 100.0, 95.0, 1.5, 1, 100.0).unwrap();
        assert!((result.max_profit - 150.0).abs() < 1e-9);
        assert!((result.max_loss - 350.0).abs() < 1e-9);
        assert!((result.ror.unwrap() - 0.428_571_428_571_428_6).abs() < 1e-9);
        assert!((result.breakeven - 98.5).abs() < 1e-9);
        assert!((result.credit_pct - 0.3).abs() < 1e-9);
        assert!((result.width - 5.0).abs() < 1e-9);
    }

    #[test]
    fn invalid_when_credit_exceeds_width() {
        let result = compute_vertical_payoff(SpreadSide::PutCredit, 100.0, 95.0, 6.0, 1, 100.0);
        assert_eq!(result.unwrap_err(), DecisionCode::InvalidSpreadGeometry);
    }

    #[test]
    fn invalid_when_credit_nonpositive() {
        let result = compute_vertical_payoff(SpreadSide::PutCredit, 100.0, 95.0, 0.0, 1, 100.0);
        assert_eq!(result.unwrap_err(), DecisionCode::InvalidSpreadGeometry);
    }

    #[test]
    fn invalid_when_width_is_zero() {
        let result = compute_vertical_payoff(SpreadSide::PutCredit, 100.0, 100.0, 1.0, 1, 100.0);
        assert_eq!(result.unwrap_err(), DecisionCode::InvalidSpreadGeometry);
    }

    #[test]
    fn property_max_profit_plus_max_loss_equals_width_times_multiplier() {
        let result = compute_vertical_payoff(SpreadSide::PutCredit, 100.0, 95.0, 1.5, 2, 100.0).unwrap();
        let width_value = 5.0 * 100.0 * 2.0;
        assert!((result.max_profit + result.max_loss - width_value).abs() < 1e-9);
    }

    #[test]
    fn ror_is_null_when_max_loss_is_zero() {
        // A zero multiplier is finite and passes the geometry checks, but
        // collapses max_loss to zero — ror must degrade to null, not NaN/inf.
        let result = compute_vertical_payoff(SpreadSide::PutCredit, 100.0, 95.0, 1.5, 1, 0.0).unwrap();
        assert!(result.ror.is_none());
        assert_eq!(result.max_loss, 0.0);
    }

    #[test]
    fn expiration_pnl_is_flat_outside_strikes_and_bounded() {
        let side = SpreadSide::PutCredit;
        assert!((expiration_pnl(side, 100.0, 95.0, 1.5, 110.0) - 1.5).abs() < 1e-9);
        assert!((expiration_pnl(side, 100.0, 95.0, 1.5, 120.0) - 1.5).abs() < 1e-9);
        assert!((expiration_pnl(side, 100.0, 95.0, 1.5, 95.0) - (-3.5)).abs() < 1e-9);
        assert!((expiration_pnl(side, 100.0, 95.0, 1.5, 50.0) - (-3.5)).abs() < 1e-9);
        assert!((expiration_pnl(side, 100.0, 95.0, 1.5, 100.0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn payoff_curve_has_120_points_spanning_clamped_range() {
        let curve = build_expiration_payoff_curve(SpreadSide::PutCredit, 100.0, 95.0, 1.5, 100.0, 0.9);
        assert_eq!(curve.len(), 120);
        assert!((curve.first().unwrap().x - 50.0).abs() < 1e-6);
        assert!((curve.last().unwrap().x - 150.0).abs() < 1e-6);
    }
}
