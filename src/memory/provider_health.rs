//! Provider-health persistence (§6 storage layout): tracks the upstream
//! market-data provider's connection/auth status across ticks, at
//! `storage/.provider_health_state.json`, so a down/failed condition
//! survives a restart instead of silently resetting to healthy.

use std::path::Path;

use chrono::{DateTime, Utc};

use super::store::{load_json_or_default, save_json_atomic};
use crate::error::Result;
use crate::types::{AuthStatus, ProviderHealthState, ProviderStatus};

impl Default for ProviderHealthState {
    fn default() -> Self {
        Self { provider_status: ProviderStatus::Down, auth_status: AuthStatus::Failed, last_auth_ok_ts: None }
    }
}

/// Derives live/partial/down from a snapshot's source tag, the same keyword
/// vocabulary `session::resolve_data_mode` uses for its LIVE/DELAYED checks.
fn provider_status_from_source(source: &str) -> ProviderStatus {
    let tag = source.to_ascii_lowercase();
    if tag.contains("live") {
        ProviderStatus::TastytradeLive
    } else if tag.contains("partial") || tag.contains("delayed") {
        ProviderStatus::TastytradePartial
    } else {
        ProviderStatus::Down
    }
}

/// Loads the persisted provider-health table, folds in the current tick's
/// source tag, and persists the result. `last_auth_ok_ts` only advances on a
/// tick where auth reads as `Ok`; it is never cleared.
pub fn update_provider_health(path: &Path, source: &str, now: DateTime<Utc>) -> Result<ProviderHealthState> {
    let mut state: ProviderHealthState = load_json_or_default(path)?;
    state.provider_status = provider_status_from_source(source);
    state.auth_status = match state.provider_status {
        ProviderStatus::Down => AuthStatus::Failed,
        ProviderStatus::TastytradeLive | ProviderStatus::TastytradePartial => AuthStatus::Ok,
    };
    if state.auth_status == AuthStatus::Ok {
        state.last_auth_ok_ts = Some(now);
    }
    save_json_atomic(path, &state)?;
    Ok(state)
}
