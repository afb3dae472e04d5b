pub mod candidate;
pub mod decision;
pub mod snapshot;
pub mod trade;
pub mod vol;

pub use candidate::{CandidateCard, CandidateMetrics, ChecklistItem, ChecklistStatus, DataKey, RankedCandidate};
pub use decision::{DecisionCode, DecisionOutput, DecisionStatus, Reason, StageResult, StageStatus};
pub use snapshot::{Candle, FeedSample, FeedTable, OptionLeg, Regime, SessionState, Snapshot, SpreadDirection};
pub use trade::{
    AuthStatus, CandidateStatus, ExecutionStatus, ProviderHealthState, ProviderStatus, TradeCandidateRecord, TradeEventRecord, TradeExecutionRecord,
};
pub use vol::{BucketAdjustment, Confidence, IvSample, ShockResult, ShockSeverity, VolFeatures, VolPolicy, VolRegime, VolSummary};
