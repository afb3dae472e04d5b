use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::candidate::CandidateCard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Open,
    Closed,
}

/// Upstream regime classification, supplied by an external classifier and
/// consumed read-only by the pipeline (glossary: Regime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    TrendUp,
    TrendDown,
    Chop,
    Compression,
    Expansion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionKind {
    Put,
    Call,
}

/// One leg of a spread. Semantic invariants (checked by [`OptionLeg::validate_semantics`]
/// beyond what `garde` expresses structurally): `strike > 0`; `delta` sign
/// matches `kind` (put ≤ 0, call ≥ 0); `qty ≥ 1`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Validate)]
pub struct OptionLeg {
    #[garde(skip)]
    pub action: LegAction,
    #[garde(skip)]
    pub kind: OptionKind,
    #[garde(range(min = 0.0001))]
    pub strike: f64,
    #[garde(range(min = -1.0, max = 1.0))]
    pub delta: f64,
    #[garde(skip)]
    pub gamma: Option<f64>,
    #[garde(skip)]
    pub premium: Option<f64>,
    #[garde(skip)]
    pub qty: Option<u32>,
    #[garde(skip)]
    pub implied_vol: Option<f64>,
}

impl OptionLeg {
    pub fn qty_or_default(&self) -> u32 {
        self.qty.unwrap_or(1).max(1)
    }

    /// Delta-sign-matches-kind invariant from §3; `garde` only bounds the
    /// range, this is the cross-field half of the check.
    pub fn has_consistent_delta_sign(&self) -> bool {
        match self.kind {
            OptionKind::Put => self.delta <= 0.0,
            OptionKind::Call => self.delta >= 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

/// One `(value, timestamp, source, error)` feed tuple from §3/§4.3.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct FeedSample<T> {
    pub value: Option<T>,
    pub ts: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub error: Option<String>,
}

impl<T> FeedSample<T> {
    pub fn age_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.ts.map(|ts| (now - ts).num_milliseconds().max(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct FeedTable {
    pub underlying_price: FeedSample<f64>,
    pub option_chain: FeedSample<serde_json::Value>,
    pub greeks: FeedSample<serde_json::Value>,
    pub intraday_candles: FeedSample<Vec<Candle>>,
    pub vwap: FeedSample<f64>,
    pub atr_1m_5: FeedSample<f64>,
    pub realized_range_15m: FeedSample<f64>,
    pub expected_move: FeedSample<f64>,
    pub regime: FeedSample<Regime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpreadDirection {
    BullPut,
    BearCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DteTargetEntry {
    pub selected_dte: Option<u32>,
    pub expiration: Option<NaiveDate>,
    pub recommendation: Option<CandidateCard>,
}

/// The full per-tick input to `evaluate` (§3). Owned by the caller and
/// consumed read-only by the pipeline — no stage mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Snapshot {
    pub as_of: DateTime<Utc>,
    pub session: SessionState,
    pub source: String,
    pub spot: f64,
    pub iv_atm: f64,
    pub iv_term: BTreeMap<u32, f64>,
    pub realized_vol: Option<f64>,
    pub vix: f64,
    pub prev_vix: f64,
    pub prev_spot: f64,
    pub candles: Vec<Candle>,
    pub feeds: FeedTable,
    pub regime: Option<Regime>,
    pub candidates: Vec<CandidateCard>,
    pub dte_targets: BTreeMap<u32, DteTargetEntry>,
}
