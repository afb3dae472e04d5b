//! Data-freshness contract (§4.3): per-feed validity, contract status, and
//! checklist-row annotation driven by a keyword mapping from row name to
//! the feeds it depends on.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::candidate::{ChecklistItem, ChecklistSection, ChecklistStatus, DataKey};
use crate::types::snapshot::{FeedTable, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Healthy,
    Degraded,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidatedFeed {
    pub key: DataKey,
    pub is_valid: bool,
    pub age_ms: Option<i64>,
    pub max_age_ms: i64,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DataContract {
    pub status: ContractStatus,
    pub feeds: std::collections::BTreeMap<DataKey, ValidatedFeed>,
}

impl DataContract {
    pub fn feed(&self, key: DataKey) -> Option<&ValidatedFeed> {
        self.feeds.get(&key)
    }
}

fn validate_feed(key: DataKey, age_ms: Option<i64>, has_value: bool, source: Option<String>) -> ValidatedFeed {
    let max_age_ms = key.max_age_ms();
    let is_valid = has_value && age_ms.is_some_and(|age| age <= max_age_ms);
    ValidatedFeed { key, is_valid, age_ms, max_age_ms, source }
}

pub struct EvaluateOptions {
    pub allow_closed_evaluation: bool,
}

/// `evaluate_data_contract` (§4.3).
pub fn evaluate_data_contract(feeds: &FeedTable, session: SessionState, now: DateTime<Utc>, opts: &EvaluateOptions) -> DataContract {
    if session == SessionState::Closed && !opts.allow_closed_evaluation {
        let inactive_feeds = DataKey::ALL
            .into_iter()
            .map(|key| {
                (
                    key,
                    ValidatedFeed { key, is_valid: false, age_ms: None, max_age_ms: key.max_age_ms(), source: Some("market closed".into()) },
                )
            })
            .collect();
        return DataContract { status: ContractStatus::Inactive, feeds: inactive_feeds };
    }

    let mut validated = std::collections::BTreeMap::new();
    validated.insert(
        DataKey::UnderlyingPrice,
        validate_feed(DataKey::UnderlyingPrice, feeds.underlying_price.age_ms(now), feeds.underlying_price.value.is_some(), feeds.underlying_price.source.clone()),
    );
    validated.insert(
        DataKey::OptionChain,
        validate_feed(DataKey::OptionChain, feeds.option_chain.age_ms(now), feeds.option_chain.value.is_some(), feeds.option_chain.source.clone()),
    );
    validated.insert(
        DataKey::Greeks,
        validate_feed(DataKey::Greeks, feeds.greeks.age_ms(now), feeds.greeks.value.is_some(), feeds.greeks.source.clone()),
    );
    validated.insert(
        DataKey::IntradayCandles,
        validate_feed(DataKey::IntradayCandles, feeds.intraday_candles.age_ms(now), feeds.intraday_candles.value.is_some(), feeds.intraday_candles.source.clone()),
    );
    validated.insert(DataKey::Vwap, validate_feed(DataKey::Vwap, feeds.vwap.age_ms(now), feeds.vwap.value.is_some(), feeds.vwap.source.clone()));
    validated.insert(
        DataKey::Atr1m5,
        validate_feed(DataKey::Atr1m5, feeds.atr_1m_5.age_ms(now), feeds.atr_1m_5.value.is_some(), feeds.atr_1m_5.source.clone()),
    );
    validated.insert(
        DataKey::RealizedRange15m,
        validate_feed(DataKey::RealizedRange15m, feeds.realized_range_15m.age_ms(now), feeds.realized_range_15m.value.is_some(), feeds.realized_range_15m.source.clone()),
    );
    validated.insert(
        DataKey::ExpectedMove,
        validate_feed(DataKey::ExpectedMove, feeds.expected_move.age_ms(now), feeds.expected_move.value.is_some(), feeds.expected_move.source.clone()),
    );
    validated.insert(
        DataKey::Regime,
        validate_feed(DataKey::Regime, feeds.regime.age_ms(now), feeds.regime.value.is_some(), feeds.regime.source.clone()),
    );

    let status = if validated.values().all(|f| f.is_valid) { ContractStatus::Healthy } else { ContractStatus::Degraded };
    DataContract { status, feeds: validated }
}

/// Keyword → required-feeds mapping for checklist-row name inference
/// (§4.3). Best-effort: see the design notes on checklist-row name
/// fragility.
fn infer_requires(name: &str) -> Vec<DataKey> {
    let lower = name.to_ascii_lowercase();
    let mut requires = Vec::new();
    if lower.contains("liquidity") {
        requires.push(DataKey::OptionChain);
    }
    if lower.contains("delta") || lower.contains("pop") {
        requires.push(DataKey::OptionChain);
        requires.push(DataKey::Greeks);
    }
    if lower.contains("vwap") {
        requires.push(DataKey::Vwap);
        requires.push(DataKey::UnderlyingPrice);
    }
    if lower.contains("atr") {
        requires.push(DataKey::Atr1m5);
    }
    if lower.contains("regime") || lower.contains("trend") || lower.contains("mtf") {
        requires.push(DataKey::Regime);
        requires.push(DataKey::IntradayCandles);
    }
    requires.sort();
    requires.dedup();
    requires
}

/// `apply_contract_to_rows` (§4.3). `_section` is accepted for symmetry
/// with the source signature; row annotation does not currently branch on
/// it beyond what `infer_requires` already captures from the row name.
pub fn apply_contract_to_rows(rows: &mut [ChecklistItem], _section: ChecklistSection, contract: &DataContract) {
    for row in rows.iter_mut() {
        if row.requires.is_empty() {
            row.requires = infer_requires(&row.name);
        }
        row.data_ages = row
            .requires
            .iter()
            .map(|key| (*key, contract.feed(*key).and_then(|f| f.age_ms)))
            .collect();

        if !row.required || row.status == ChecklistStatus::Na {
            continue;
        }

        if contract.status == ContractStatus::Degraded {
            if let Some(invalid_key) = row.requires.iter().find(|key| contract.feed(**key).is_some_and(|f| !f.is_valid)) {
                let feed = contract.feed(*invalid_key).expect("checked above");
                row.status = ChecklistStatus::Blocked;
                row.detail = format!(
                    "stale/missing feed: {invalid_key:?} (age={}, max={}, source={})",
                    feed.age_ms.map_or("null".to_string(), |a| a.to_string()),
                    feed.max_age_ms,
                    feed.source.as_deref().unwrap_or("unknown")
                );
                continue;
            }
        }

        if row.status == ChecklistStatus::Fail && row.detail == "data missing" {
            row.detail = "Threshold failed with fresh data.".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::snapshot::{FeedSample, Regime};

    fn fresh_feeds(now: DateTime<Utc>) -> FeedTable {
        FeedTable {
            underlying_price: FeedSample { value: Some(5000.0), ts: Some(now), source: Some("live".into()), error: None },
            option_chain: FeedSample { value: Some(serde_json::json!({})), ts: Some(now), source: Some("live".into()), error: None },
            greeks: FeedSample { value: Some(serde_json::json!({})), ts: Some(now), source: Some("live".into()), error: None },
            intraday_candles: FeedSample { value: Some(vec![]), ts: Some(now), source: Some("live".into()), error: None },
            vwap: FeedSample { value: Some(5000.0), ts: Some(now), source: Some("live".into()), error: None },
            atr_1m_5: FeedSample { value: Some(3.0), ts: Some(now), source: Some("live".into()), error: None },
            realized_range_15m: FeedSample { value: Some(2.0), ts: Some(now), source: Some("live".into()), error: None },
            expected_move: FeedSample { value: Some(40.0), ts: Some(now), source: Some("live".into()), error: None },
            regime: FeedSample { value: Some(Regime::Chop), ts: Some(now), source: Some("live".into()), error: None },
        }
    }

    #[test]
    fn closed_session_without_override_is_inactive() {
        let now = Utc::now();
        let contract = evaluate_data_contract(&FeedTable::default(), SessionState::Closed, now, &EvaluateOptions { allow_closed_evaluation: false });
        assert_eq!(contract.status, ContractStatus::Inactive);
        assert!(contract.feeds.values().all(|f| !f.is_valid));
    }

    #[test]
    fn fresh_feeds_yield_healthy_contract() {
        let now = Utc::now();
        let contract = evaluate_data_contract(&fresh_feeds(now), SessionState::Open, now, &EvaluateOptions { allow_closed_evaluation: false });
        assert_eq!(contract.status, ContractStatus::Healthy);
    }

    #[test]
    fn stale_feed_degrades_contract() {
        let now = Utc::now();
        let mut feeds = fresh_feeds(now);
        feeds.underlying_price.ts = Some(now - chrono::Duration::seconds(60));
        let contract = evaluate_data_contract(&feeds, SessionState::Open, now, &EvaluateOptions { allow_closed_evaluation: false });
        assert_eq!(contract.status, ContractStatus::Degraded);
        assert!(!contract.feed(DataKey::UnderlyingPrice).unwrap().is_valid);
    }

    #[test]
    fn infer_requires_maps_known_keywords() {
        assert_eq!(infer_requires("Liquidity check"), vec![DataKey::OptionChain]);
        assert_eq!(infer_requires("Delta in band"), vec![DataKey::OptionChain, DataKey::Greeks]);
        assert_eq!(infer_requires("VWAP reclaim"), vec![DataKey::UnderlyingPrice, DataKey::Vwap]);
    }

    #[test]
    fn degraded_contract_blocks_required_row_on_stale_dependency() {
        let now = Utc::now();
        let mut feeds = fresh_feeds(now);
        feeds.option_chain.ts = Some(now - chrono::Duration::seconds(60));
        let contract = evaluate_data_contract(&feeds, SessionState::Open, now, &EvaluateOptions { allow_closed_evaluation: false });

        let mut rows = vec![ChecklistItem {
            id: "liq".into(),
            name: "Liquidity check".into(),
            status: ChecklistStatus::Pass,
            required: true,
            detail: "ok".into(),
            reason: None,
            requires: vec![],
            data_ages: Default::default(),
            observed: None,
            thresholds: None,
        }];
        apply_contract_to_rows(&mut rows, ChecklistSection::Global, &contract);
        assert_eq!(rows[0].status, ChecklistStatus::Blocked);
        assert!(rows[0].detail.starts_with("stale/missing feed"));
    }

    #[test]
    fn generic_fail_detail_is_replaced_with_fresh_data_message() {
        let now = Utc::now();
        let contract = evaluate_data_contract(&fresh_feeds(now), SessionState::Open, now, &EvaluateOptions { allow_closed_evaluation: false });
        let mut rows = vec![ChecklistItem {
            id: "delta".into(),
            name: "Delta band".into(),
            status: ChecklistStatus::Fail,
            required: true,
            detail: "data missing".into(),
            reason: None,
            requires: vec![],
            data_ages: Default::default(),
            observed: None,
            thresholds: None,
        }];
        apply_contract_to_rows(&mut rows, ChecklistSection::Global, &contract);
        assert_eq!(rows[0].detail, "Threshold failed with fresh data.");
    }
}
