use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::snapshot::SpreadDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    Generated,
    Accepted,
    Rejected,
    Expired,
    Invalidated,
}

impl CandidateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CandidateStatus::Expired | CandidateStatus::Invalidated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserDecision {
    Taken,
    Skipped,
    Watchlist,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TradeCandidateRecord {
    pub candidate_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dte_bucket: u32,
    pub direction: SpreadDirection,
    pub expiration: NaiveDate,
    pub short_strike: f64,
    pub long_strike: f64,
    pub width: f64,
    pub quoted_credit: f64,
    pub mid_price_at_signal: Option<f64>,
    pub spot_at_signal: f64,
    pub atm_iv_at_signal: f64,
    pub em_1sd_at_signal: f64,
    pub zscore_at_signal: Option<f64>,
    pub mmc_stretch_at_signal: Option<f64>,
    #[serde(default)]
    pub indicator_snapshot: Value,
    pub status: CandidateStatus,
    pub user_decision: Option<UserDecision>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Open,
    Closed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TradeExecutionRecord {
    pub trade_id: String,
    pub candidate_id: String,
    pub strategy: String,
    pub direction: SpreadDirection,
    pub dte_bucket: u32,
    pub expiration: NaiveDate,
    pub strikes: Vec<f64>,
    pub width: f64,
    pub opened_at: DateTime<Utc>,
    pub filled_credit: f64,
    pub quantity: u32,
    pub fees_estimate: f64,
    pub status: ExecutionStatus,
    pub close_price: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub realized_pnl: Option<f64>,
    pub max_profit: f64,
    pub max_loss: f64,
    pub break_even: f64,
    pub current_mark: Option<f64>,
    pub unrealized_pnl: Option<f64>,
    pub pnl_percent_of_risk: Option<f64>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeEventType {
    CandidateCreated,
    AlertSent,
    TradeTaken,
    TradeSkipped,
    PositionOpened,
    PositionMarked,
    PositionClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TradeEventRecord {
    pub event_id: String,
    pub ts: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: TradeEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dte_bucket: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderStatus {
    TastytradeLive,
    TastytradePartial,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Ok,
    Refreshing,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderHealthState {
    pub provider_status: ProviderStatus,
    pub auth_status: AuthStatus,
    pub last_auth_ok_ts: Option<DateTime<Utc>>,
}
