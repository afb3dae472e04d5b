use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::vol::Confidence;

use super::vertical::SpreadSide;

/// Abramowitz & Stegun formula 7.1.26, documented error bound < 1.5e-7 for
/// `|x| < 6` (§4.1).
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Raw IV values above 3.0 are percent, not decimal (§9 IV units).
pub fn normalize_iv(iv: f64) -> f64 {
    if iv > 3.0 {
        iv / 100.0
    } else {
        iv
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct PopAndTouch {
    pub pop: Option<f64>,
    pub prob_itm_short: Option<f64>,
    pub pot: Option<f64>,
    pub confidence: Confidence,
}

/// §4.1 `compute_pop_and_touch`. The PoP formula depends only on whether the
/// breakeven is a lower bound (put side) or upper bound (call side) — the
/// same `z`-score expression is used for credit and debit verticals, since
/// probability of ending above/below a level does not depend on which way
/// premium flowed; the spec names only the credit cases explicitly.
pub fn compute_pop_and_touch(side: SpreadSide, breakeven: f64, short_strike: f64, spot: f64, dte: f64, iv_raw: f64) -> PopAndTouch {
    let iv = normalize_iv(iv_raw);
    let is_put = matches!(side, SpreadSide::PutCredit | SpreadSide::PutDebit);

    if dte <= 0.0 || iv <= 0.0 || spot <= 0.0 {
        return PopAndTouch {
            pop: None,
            prob_itm_short: None,
            pot: None,
            confidence: Confidence::Low,
        };
    }

    let t = dte / 365.0;
    let sigma_sqrt_t = iv * t.sqrt();
    if sigma_sqrt_t <= 0.0 {
        return PopAndTouch {
            pop: None,
            prob_itm_short: None,
            pot: None,
            confidence: Confidence::Low,
        };
    }

    let z = |strike: f64| (strike / spot).ln() / sigma_sqrt_t;

    let z_be = z(breakeven);
    let pop = if is_put { 1.0 - normal_cdf(z_be) } else { normal_cdf(z_be) };

    let z_short = z(short_strike);
    let prob_itm_short = if is_put { normal_cdf(z_short) } else { 1.0 - normal_cdf(z_short) };
    let pot = (2.0 * prob_itm_short).clamp(0.0, 1.0);

    let confidence = if (7.0..=60.0).contains(&dte) && (0.05..=1.5).contains(&iv) {
        Confidence::High
    } else {
        Confidence::Med
    };

    PopAndTouch {
        pop: Some(pop),
        prob_itm_short: Some(prob_itm_short),
        pot: Some(pot),
        confidence,
    }
}
