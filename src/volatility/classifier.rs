//! `classify_vol_regime` (§4.2): deterministic regime classification from
//! whichever of percentile / iv-vs-rv / term-slope is available.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::VolatilityConfig;
use crate::payoff::normalize_iv;
use crate::types::{Confidence, DecisionCode, IvSample, Reason, VolFeatures, VolRegime};

use super::cache::compute_percentile;

pub struct ClassifyInputs<'a> {
    pub iv_atm_raw: Option<f64>,
    pub iv_atm_age_ms: i64,
    pub realized_vol: Option<f64>,
    pub realized_range_15m: Option<f64>,
    pub iv_term: &'a BTreeMap<u32, f64>,
    pub samples: &'a [IvSample],
    pub as_of: DateTime<Utc>,
}

pub struct ClassifyOutcome {
    pub regime: VolRegime,
    pub confidence: Confidence,
    pub features: VolFeatures,
    pub warnings: Vec<Reason>,
}

fn term_slope(iv_term: &BTreeMap<u32, f64>) -> Option<f64> {
    let min_dte = *iv_term.keys().min()?;
    let max_dte = *iv_term.keys().max()?;
    if min_dte == max_dte {
        return None;
    }
    let iv_min = iv_term[&min_dte];
    let iv_max = iv_term[&max_dte];
    Some((iv_max - iv_min) / f64::from(max_dte - min_dte))
}

pub fn classify_vol_regime(inputs: &ClassifyInputs<'_>, cfg: &VolatilityConfig) -> ClassifyOutcome {
    let mut warnings = Vec::new();

    let Some(iv_atm_raw) = inputs.iv_atm_raw else {
        warnings.push(Reason::new(DecisionCode::VolRegimeUnknown, "iv_atm is missing"));
        return ClassifyOutcome {
            regime: VolRegime::Unknown,
            confidence: Confidence::Low,
            features: VolFeatures::default(),
            warnings,
        };
    };
    let iv_atm = normalize_iv(iv_atm_raw);

    if inputs.iv_atm_age_ms > cfg.iv_fresh_max_age_ms {
        warnings.push(Reason::new(DecisionCode::VolRegimeUnknown, "iv_atm reading is stale").with_details(
            serde_json::json!({"age_ms": inputs.iv_atm_age_ms, "max_age_ms": cfg.iv_fresh_max_age_ms}),
        ));
    }

    let (iv_percentile, sample_count, insufficient) = compute_percentile(iv_atm, inputs.samples, cfg.lookback_days, inputs.as_of);
    if insufficient || sample_count < cfg.min_samples {
        warnings.push(
            Reason::new(DecisionCode::VolCacheInsufficient, "iv percentile cache below minimum sample count")
                .with_details(serde_json::json!({"sample_count": sample_count, "min_samples": cfg.min_samples})),
        );
    }

    let rv = inputs.realized_vol.or(inputs.realized_range_15m);
    let iv_vs_rv = rv.filter(|rv| *rv > 0.0).map(|rv| iv_atm / rv);
    let slope = term_slope(inputs.iv_term);

    let features = VolFeatures {
        iv_atm: Some(iv_atm),
        iv_percentile,
        sample_count,
        iv_vs_rv,
        term_slope: slope,
    };

    let regime = decide_regime(&features, cfg);
    if regime == VolRegime::Unknown {
        warnings.push(Reason::new(DecisionCode::VolRegimeUnknown, "no classifier signal available"));
    }

    let present_count = [features.iv_percentile.is_some(), features.iv_vs_rv.is_some(), features.term_slope.is_some()]
        .iter()
        .filter(|x| **x)
        .count();
    let confidence = if regime == VolRegime::Unknown || present_count <= 1 {
        Confidence::Low
    } else if present_count >= 3 && sample_count >= cfg.min_samples {
        Confidence::High
    } else {
        Confidence::Med
    };

    ClassifyOutcome { regime, confidence, features, warnings }
}

fn decide_regime(features: &VolFeatures, cfg: &VolatilityConfig) -> VolRegime {
    if let Some(pctl) = features.iv_percentile {
        return regime_from_percentile(pctl, cfg);
    }
    if let Some(ratio) = features.iv_vs_rv {
        if ratio >= cfg.iv_vs_rv_expanding {
            return VolRegime::VolExpanding;
        }
        if ratio <= cfg.iv_vs_rv_suppressed {
            return VolRegime::VolSuppressed;
        }
        return VolRegime::VolNormal;
    }
    if let Some(slope) = features.term_slope {
        if slope >= cfg.term_slope_expanding {
            return VolRegime::VolExpanding;
        }
        return VolRegime::VolNormal;
    }
    VolRegime::Unknown
}

fn regime_from_percentile(pctl: f64, cfg: &VolatilityConfig) -> VolRegime {
    if pctl >= cfg.extreme_pctl {
        VolRegime::VolExtreme
    } else if pctl >= cfg.high_pctl {
        VolRegime::VolExpanding
    } else if pctl <= cfg.low_pctl {
        VolRegime::VolSuppressed
    } else {
        VolRegime::VolNormal
    }
}
