//! Trade memory: persisted candidate/execution tables and an append-only
//! event log (§4.9).

pub mod candidates;
pub mod events;
pub mod executions;
pub mod provider_health;
pub mod store;

pub use candidates::{accept_candidate_as_trade, reject_candidate, upsert_candidates_from_decision};
pub use executions::{close_trade, update_open_trade_marks_from_decision};
pub use provider_health::update_provider_health;
