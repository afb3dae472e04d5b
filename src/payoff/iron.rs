use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::decision::DecisionCode;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct IronPayoffResult {
    pub max_profit: f64,
    pub max_loss: f64,
    pub ror: Option<f64>,
    pub breakeven_low: f64,
    pub breakeven_high: f64,
    pub credit_pct: f64,
    pub width: f64,
}

/// Closed-form iron-condor/fly payoff (§4.1). `short_put < short_call` is
/// the geometry invariant (testable property 3); both wings share `width`.
pub fn compute_iron_payoff(
    short_put: f64,
    short_call: f64,
    width: f64,
    credit: f64,
    contracts: u32,
    multiplier: f64,
) -> Result<IronPayoffResult, DecisionCode> {
    let finite = short_put.is_finite()
        && short_call.is_finite()
        && width.is_finite()
        && credit.is_finite()
        && multiplier.is_finite();
    if !finite || width <= 0.0 || credit >= width || credit <= 0.0 || short_put >= short_call {
        return Err(DecisionCode::InvalidSpreadGeometry);
    }

    let contracts = f64::from(contracts);
    let max_profit = credit * multiplier * contracts;
    let max_loss = (width - credit) * multiplier * contracts;
    let ror = if max_loss > 0.0 { Some(max_profit / max_loss) } else { None };

    Ok(IronPayoffResult {
        max_profit,
        max_loss,
        ror,
        breakeven_low: short_put - credit,
        breakeven_high: short_call + credit,
        credit_pct: credit / width,
        width,
    })
}

/// Piecewise-linear expiration value of an iron condor, built from the two
/// vertical wings (put-credit below `short_put`, call-credit above
/// `short_call`); flat at `+credit` between the short strikes.
pub fn expiration_pnl(short_put: f64, short_call: f64, width: f64, credit: f64, underlying: f64) -> f64 {
    let long_put = short_put - width;
    let long_call = short_call + width;

    let put_wing_loss = ((short_put - underlying).max(0.0) - (long_put - underlying).max(0.0)).clamp(0.0, width);
    let call_wing_loss =
        ((underlying - short_call).max(0.0) - (underlying - long_call).max(0.0)).clamp(0.0, width);

    credit - put_wing_loss - call_wing_loss
}
