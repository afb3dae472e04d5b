//! US regular-trading-hours detection, chart-instrument selection, and the
//! data-mode resolver (§6 External interfaces).

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::SessionState;

const RTH_START_MINUTE: u32 = 570; // 09:30 local
const RTH_END_MINUTE: u32 = 960; // 16:00 local

/// US RTH: weekday Mon-Fri and minute-of-day in `[570, 960)` America/New_York.
pub fn is_regular_trading_hours(now: DateTime<Utc>) -> bool {
    let local = now.with_timezone(&New_York);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let minute_of_day = local.hour() * 60 + local.minute();
    (RTH_START_MINUTE..RTH_END_MINUTE).contains(&minute_of_day)
}

pub fn session_state(now: DateTime<Utc>) -> SessionState {
    if is_regular_trading_hours(now) {
        SessionState::Open
    } else {
        SessionState::Closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChartInstrument {
    Spx,
    Es,
}

pub fn chart_instrument(now: DateTime<Utc>) -> ChartInstrument {
    if is_regular_trading_hours(now) {
        ChartInstrument::Spx
    } else {
        ChartInstrument::Es
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataMode {
    Live,
    Delayed,
    Historical,
    Fixture,
}

pub struct DataModeInputs<'a> {
    pub source_tag: &'a str,
    pub session: SessionState,
    pub simulation_mode: bool,
    pub core_feeds_fresh: bool,
}

/// `resolve_data_mode` (§6): source-tag keyword matching layered with
/// session/simulation/feed-freshness, in the fixed precedence order the
/// table implies (LIVE checked first, FIXTURE the catch-all).
pub fn resolve_data_mode(inputs: &DataModeInputs) -> DataMode {
    let tag = inputs.source_tag.to_ascii_lowercase();

    if tag.contains("live") && inputs.core_feeds_fresh {
        return DataMode::Live;
    }
    if (tag.contains("live") || tag.contains("partial") || tag.contains("delayed") || tag.contains("cache")) && !inputs.core_feeds_fresh {
        return DataMode::Delayed;
    }
    if tag.contains("snapshot-log") || tag.contains("historical") || tag.contains("stooq") || tag.contains("archive") {
        return DataMode::Historical;
    }
    if (tag.contains("fixture") || tag.contains("inactive") || tag.contains("market-closed")) && inputs.simulation_mode {
        return DataMode::Historical;
    }
    if inputs.session == SessionState::Closed {
        return DataMode::Fixture;
    }
    DataMode::Fixture
}
