//! Append-only trade-event log (§3 `TradeEventRecord`, §4.9).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::ids::event_id;
use crate::types::{TradeEventRecord, TradeEventType};

use super::store::append_jsonl;

#[allow(clippy::too_many_arguments)]
pub fn build_event(
    event_type: TradeEventType,
    now: DateTime<Utc>,
    candidate_id: Option<String>,
    trade_id: Option<String>,
    strategy: Option<String>,
    dte_bucket: Option<u32>,
    payload: Option<Value>,
) -> TradeEventRecord {
    TradeEventRecord {
        event_id: event_id(now.timestamp_millis()),
        ts: now,
        event_type,
        candidate_id,
        trade_id,
        strategy,
        dte_bucket,
        payload,
    }
}

/// Appends one event. Per §4.9 this is treated by callers as non-fatal:
/// the primary table write this accompanies has already succeeded and must
/// not be rolled back if this fails.
pub fn append_event(path: &Path, event: &TradeEventRecord) -> Result<()> {
    append_jsonl(path, event)
}
