use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single historical at-the-money IV reading (§3). `iv_atm` is stored as
/// decimal; values above 3.0 recorded upstream are percent and must be
/// normalised via [`crate::payoff::normalize_iv`] before being cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IvSample {
    pub ts_iso: String,
    pub iv_atm: f64,
}

impl IvSample {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.ts_iso).ok().map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolRegime {
    VolSuppressed,
    VolNormal,
    VolExpanding,
    VolExtreme,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Med,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default)]
pub struct VolFeatures {
    pub iv_atm: Option<f64>,
    pub iv_percentile: Option<f64>,
    pub sample_count: usize,
    pub iv_vs_rv: Option<f64>,
    pub term_slope: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ShockSeverity {
    None,
    Warn,
    Block,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct ShockResult {
    pub triggered: bool,
    pub severity: ShockSeverity,
    pub move_pct_em_1sd: f64,
    pub vix_delta: f64,
}

/// Per-bucket adjustments layered on top of a candidate's base thresholds
/// when its DTE bucket survives the regime's policy overlay (§4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default)]
pub struct BucketAdjustment {
    pub delta_band_shift: f64,
    pub min_sd_shift: f64,
    pub min_credit_pct_shift: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VolPolicy {
    pub regime: VolRegime,
    pub allowed_dte_buckets: BTreeSet<u32>,
    pub adjustments: std::collections::BTreeMap<u32, BucketAdjustment>,
}

impl VolPolicy {
    pub fn is_bucket_allowed(&self, dte_bucket: u32) -> bool {
        self.allowed_dte_buckets.contains(&dte_bucket)
    }

    pub fn adjustment_for(&self, dte_bucket: u32) -> BucketAdjustment {
        self.adjustments.get(&dte_bucket).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VolSummary {
    pub regime: VolRegime,
    pub confidence: Confidence,
    pub features: VolFeatures,
    pub shock: ShockResult,
    pub policy: VolPolicy,
}
