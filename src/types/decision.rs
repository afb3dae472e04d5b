use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::candidate::{CandidateCard, RankedCandidate};
use super::vol::VolSummary;

/// Closed enumeration of every reason code the engine can attach to a
/// `Reason`. Deliberately flat (not grouped by stage) — a `Reason` always
/// names exactly one of these regardless of which stage emitted it. Derives
/// `thiserror::Error` purely for its `Display` message template; `DecisionCode`
/// is never itself thrown, only carried inside a `Reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionCode {
    // Preflight
    #[error("market is closed")]
    MarketClosed,
    #[error("simulation mode is active")]
    SimulationActive,
    #[error("spot feed is stale")]
    SpotStale,
    #[error("option chain feed is stale")]
    ChainStale,
    #[error("greeks feed is stale")]
    GreeksStale,
    #[error("spot data is stale")]
    DataStaleSpot,
    #[error("option chain data is stale")]
    DataStaleChain,
    #[error("greeks data is stale")]
    DataStaleGreeks,
    // Volatility
    #[error("volatility regime could not be classified")]
    VolRegimeUnknown,
    #[error("insufficient IV history to classify volatility regime")]
    VolCacheInsufficient,
    #[error("a volatility shock was detected")]
    VolShock,
    #[error("a volatility shock was detected (warning only)")]
    VolShockWarn,
    #[error("volatility policy disabled this DTE bucket")]
    VolPolicyBucketDisabled,
    // Bucketing
    #[error("no expiration is available for this DTE bucket")]
    MissingExpiryForBucket,
    #[error("market regime is unclassified")]
    RegimeUnclassified,
    #[error("0DTE is disabled by feature flag")]
    Feature0dteDisabled,
    // Candidate
    #[error("spread geometry is invalid")]
    InvalidSpreadGeometry,
    #[error("one or more required checklist gates were not met")]
    HardGatesNotMet,
    #[error("no credit spread candidate survived filtering")]
    NoCreditSpreadCandidate,
    #[error("short leg delta is out of band")]
    DeltaOutOfBand,
    #[error("standard-deviation multiple is too low")]
    SdMultipleLow,
    #[error("measured-move-completion gate failed")]
    MmcGateFail,
    #[error("support/resistance buffer is too thin")]
    SrBufferThin,
    #[error("candidate direction conflicts with the prevailing trend")]
    TrendMismatch,
    #[error("credit efficiency is too low")]
    LowCreditEfficiency,
    #[error("liquidity is thin (warning only)")]
    SoftLiquidityWarning,
    #[error("slippage risk is elevated (warning only)")]
    SoftSlippageWarning,
    // Probabilistic gate
    #[error("probability of profit is unavailable")]
    PopUnavailable,
    #[error("probability of profit is below threshold")]
    PopTooLow,
    #[error("return on risk is below threshold")]
    RorTooLow,
    #[error("credit as a percentage of width is below threshold")]
    CreditPctTooLow,
    // Alerts
    #[error("alerts are suppressed while in simulation mode")]
    AlertsSuppressedSimulation,
    #[error("alert cooldown is active")]
    AlertCooldownActive,
    #[error("daily alert cap has been reached")]
    AlertDayCapReached,
    #[error("alert was deduplicated")]
    AlertDeduped,
    #[error("candidate-ready alert is debounced")]
    CandidateReadyDebounced,
}

/// A single structured reason attached to a decision's `blocks` or
/// `warnings` list. The engine never throws for domain errors — this is the
/// mechanism instead (§7).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Reason {
    pub code: DecisionCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Reason {
    pub fn new(code: DecisionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pass,
    Block,
    NoCandidate,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageResult {
    pub stage_name: String,
    pub status: StageStatus,
    pub reasons: Vec<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl StageResult {
    pub fn pass(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Pass,
            reasons: Vec::new(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Ready,
    Degraded,
    Blocked,
    NoCandidate,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DteBucketResolution {
    pub target: u32,
    pub selected: Option<u32>,
    pub distance: Option<u32>,
    pub expiration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecisionDebug {
    pub run_id: String,
    pub stages: Vec<StageResult>,
}

/// The immutable output of one `evaluate` call. Never mutated once
/// constructed — every stage appends to a builder that is consumed into this
/// at the end of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DecisionOutput {
    pub status: DecisionStatus,
    pub decision_mode: crate::config::DecisionMode,
    pub blocks: Vec<Reason>,
    pub warnings: Vec<Reason>,
    pub vol: VolSummary,
    pub candidates: Vec<CandidateCard>,
    pub ranked: Vec<RankedCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_candidate_id: Option<String>,
    pub dte_buckets: Vec<DteBucketResolution>,
    pub debug: DecisionDebug,
}

impl DecisionOutput {
    pub fn has_code(&self, code: DecisionCode) -> bool {
        self.blocks.iter().chain(self.warnings.iter()).any(|r| r.code == code)
    }
}
