use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decision::DecisionCode;
use super::snapshot::{OptionLeg, SpreadDirection};

/// The nine feed keys of the data-freshness contract (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataKey {
    UnderlyingPrice,
    OptionChain,
    Greeks,
    IntradayCandles,
    Vwap,
    Atr1m5,
    RealizedRange15m,
    ExpectedMove,
    Regime,
}

impl DataKey {
    pub const ALL: [DataKey; 9] = [
        DataKey::UnderlyingPrice,
        DataKey::OptionChain,
        DataKey::Greeks,
        DataKey::IntradayCandles,
        DataKey::Vwap,
        DataKey::Atr1m5,
        DataKey::RealizedRange15m,
        DataKey::ExpectedMove,
        DataKey::Regime,
    ];

    /// Fixed max age in milliseconds, per §4.3.
    pub fn max_age_ms(self) -> i64 {
        match self {
            DataKey::UnderlyingPrice => 15_000,
            DataKey::OptionChain => 20_000,
            DataKey::Greeks => 20_000,
            DataKey::IntradayCandles => 90_000,
            DataKey::Vwap => 90_000,
            DataKey::Atr1m5 => 90_000,
            DataKey::RealizedRange15m => 180_000,
            DataKey::ExpectedMove => 300_000,
            DataKey::Regime => 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistStatus {
    Pass,
    Fail,
    Blocked,
    Na,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ChecklistSection {
    Global,
    Regime,
    Strategy,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChecklistItem {
    pub id: String,
    pub name: String,
    pub status: ChecklistStatus,
    pub required: bool,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DecisionCode>,
    pub requires: Vec<DataKey>,
    pub data_ages: BTreeMap<DataKey, Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Value>,
}

impl ChecklistItem {
    pub fn is_blocking_in_strict(&self) -> bool {
        self.required && matches!(self.status, ChecklistStatus::Blocked | ChecklistStatus::Fail)
    }
}

/// Payoff/probability metrics attached to a candidate by `CandidateMetrics`
/// (§4.1, §4.7 stage 5-ish). `None` until that stage runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default)]
pub struct CandidateMetrics {
    pub max_profit: Option<f64>,
    pub max_loss: Option<f64>,
    pub ror: Option<f64>,
    pub breakeven: Option<f64>,
    pub breakeven_low: Option<f64>,
    pub breakeven_high: Option<f64>,
    pub credit_pct: Option<f64>,
    pub pop: Option<f64>,
    pub pot: Option<f64>,
    pub ev: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CandidateCard {
    pub candidate_id: String,
    pub strategy: String,
    pub ready: bool,
    pub width: f64,
    pub credit: f64,
    pub adjusted_premium: f64,
    pub legs: Vec<OptionLeg>,
    pub direction: SpreadDirection,
    pub dte: u32,
    pub bid_ask_spread: Option<f64>,
    pub global_checklist: Vec<ChecklistItem>,
    pub regime_checklist: Vec<ChecklistItem>,
    pub strategy_checklist: Vec<ChecklistItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hard_block_code: Option<DecisionCode>,
    #[serde(default)]
    pub metrics: CandidateMetrics,
}

impl CandidateCard {
    pub fn all_checklist_items(&self) -> impl Iterator<Item = &ChecklistItem> {
        self.global_checklist
            .iter()
            .chain(self.regime_checklist.iter())
            .chain(self.strategy_checklist.iter())
    }

    pub fn short_leg(&self) -> Option<&OptionLeg> {
        use super::snapshot::LegAction;
        self.legs.iter().find(|l| l.action == LegAction::Sell)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RankedCandidate {
    pub rank: u32,
    pub candidate_id: String,
    pub delta_fit: f64,
    pub credit_per_width: f64,
    pub gamma_penalty: f64,
}
