use std::path::PathBuf;

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Evaluation mode: whether a failed required checklist row hard-blocks the
/// candidate (`Strict`) or degrades to a soft warning (`Probabilistic`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionMode {
    Strict,
    Probabilistic,
}

impl Default for DecisionMode {
    fn default() -> Self {
        Self::Strict
    }
}

/// Volatility-classifier thresholds, overridable via environment at
/// construction time. See SPEC_FULL.md §4.2.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct VolatilityConfig {
    #[garde(range(min = 10))]
    pub lookback_days: i64,
    #[garde(range(min = 5))]
    pub min_samples: usize,
    #[garde(range(min = 0))]
    pub iv_fresh_max_age_ms: i64,
    #[garde(range(min = 0.0, max = 100.0))]
    pub low_pctl: f64,
    #[garde(range(min = 0.0, max = 100.0))]
    pub high_pctl: f64,
    #[garde(range(min = 0.0, max = 100.0))]
    pub extreme_pctl: f64,
    #[garde(range(min = 0.0))]
    pub iv_vs_rv_suppressed: f64,
    #[garde(range(min = 0.0))]
    pub iv_vs_rv_expanding: f64,
    #[garde(range(min = 0.0))]
    pub term_slope_expanding: f64,
    #[garde(range(min = 0.0))]
    pub shock_move_pct_em1sd: f64,
    #[garde(range(min = 0.0))]
    pub shock_vix_jump: f64,
    #[garde(skip)]
    pub policy_extreme_block_all: bool,
    #[garde(skip)]
    pub policy_expanding_allow_2dte: bool,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            lookback_days: 60,
            min_samples: 20,
            iv_fresh_max_age_ms: 5_000,
            low_pctl: 25.0,
            high_pctl: 70.0,
            extreme_pctl: 90.0,
            iv_vs_rv_suppressed: 0.8,
            iv_vs_rv_expanding: 1.6,
            term_slope_expanding: 0.03,
            shock_move_pct_em1sd: 0.35,
            shock_vix_jump: 2.0,
            policy_extreme_block_all: false,
            policy_expanding_allow_2dte: false,
        }
    }
}

/// Storage paths for the three persisted tables and the event log, each
/// independently overridable by environment variable (§6 Storage layout).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageConfig {
    pub iv_cache_path: PathBuf,
    pub candidates_path: PathBuf,
    pub executions_path: PathBuf,
    pub events_path: PathBuf,
    pub provider_health_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            iv_cache_path: PathBuf::from("storage/.iv_atm_cache.json"),
            candidates_path: PathBuf::from("storage/.trade_candidates.json"),
            executions_path: PathBuf::from("storage/.trade_executions.json"),
            events_path: PathBuf::from("storage/trade_events.jsonl"),
            provider_health_path: PathBuf::from("storage/.provider_health_state.json"),
        }
    }
}

impl StorageConfig {
    fn from_env() -> Self {
        let default = Self::default();
        Self {
            iv_cache_path: env_path("IV_CACHE_PATH", &default.iv_cache_path),
            candidates_path: env_path("TRADE_CANDIDATES_PATH", &default.candidates_path),
            executions_path: env_path("TRADE_EXECUTIONS_PATH", &default.executions_path),
            events_path: env_path("TRADE_EVENTS_PATH", &default.events_path),
            provider_health_path: env_path("PROVIDER_HEALTH_PATH", &default.provider_health_path),
        }
    }
}

fn env_path(key: &str, default: &PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| default.clone())
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Top-level engine configuration. Constructed via [`EngineConfig::from_env`]
/// (mirroring the source repo's `CachedStore::from_env`), validated before
/// use so malformed configuration fails at construction rather than mid-tick.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct EngineConfig {
    #[garde(skip)]
    pub decision_mode: DecisionMode,
    #[garde(skip)]
    pub simulation_mode: bool,
    #[garde(skip)]
    pub allow_sim_alerts: bool,
    #[garde(skip)]
    pub strict_live_blocks: bool,
    #[garde(skip)]
    pub feature_0dte: bool,
    #[garde(skip)]
    pub prob_max_gamma_penalty: bool,
    #[garde(dive)]
    pub volatility: VolatilityConfig,
    #[garde(skip)]
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_mode: DecisionMode::default(),
            simulation_mode: false,
            allow_sim_alerts: false,
            strict_live_blocks: true,
            feature_0dte: false,
            prob_max_gamma_penalty: true,
            volatility: VolatilityConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads `.env` (if present) then layers environment overrides onto the
    /// documented defaults, validating the result.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let default = Self::default();
        let cfg = Self {
            decision_mode: if env_bool("PROBABILISTIC_MODE", false) {
                DecisionMode::Probabilistic
            } else {
                DecisionMode::Strict
            },
            simulation_mode: env_bool("SIMULATION_MODE", default.simulation_mode),
            allow_sim_alerts: env_bool("ALLOW_SIM_ALERTS", default.allow_sim_alerts),
            strict_live_blocks: env_bool("STRICT_LIVE_BLOCKS", default.strict_live_blocks),
            feature_0dte: env_bool("FEATURE_0DTE", default.feature_0dte),
            prob_max_gamma_penalty: env_bool("PROB_MAX_GAMMA_PENALTY", default.prob_max_gamma_penalty),
            volatility: VolatilityConfig {
                lookback_days: env_num("VOL_LOOKBACK_DAYS", default.volatility.lookback_days),
                min_samples: env_num("VOL_MIN_SAMPLES", default.volatility.min_samples),
                iv_fresh_max_age_ms: env_num("VOL_IV_FRESH_MAX_AGE_MS", default.volatility.iv_fresh_max_age_ms),
                low_pctl: env_num("VOL_PCTL_LOW", default.volatility.low_pctl),
                high_pctl: env_num("VOL_PCTL_HIGH", default.volatility.high_pctl),
                extreme_pctl: env_num("VOL_PCTL_EXTREME", default.volatility.extreme_pctl),
                iv_vs_rv_suppressed: default.volatility.iv_vs_rv_suppressed,
                iv_vs_rv_expanding: default.volatility.iv_vs_rv_expanding,
                term_slope_expanding: default.volatility.term_slope_expanding,
                shock_move_pct_em1sd: env_num("SHOCK_MOVE_PCT_EM1SD", default.volatility.shock_move_pct_em1sd),
                shock_vix_jump: env_num("SHOCK_VIX_JUMP", default.volatility.shock_vix_jump),
                policy_extreme_block_all: env_bool(
                    "VOL_POLICY_EXTREME_BLOCK_ALL",
                    default.volatility.policy_extreme_block_all,
                ),
                policy_expanding_allow_2dte: env_bool(
                    "VOL_POLICY_EXPANDING_ALLOW_2DTE",
                    default.volatility.policy_expanding_allow_2dte,
                ),
            },
            storage: StorageConfig::from_env(),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lookback_below_minimum_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.volatility.lookback_days = 3;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_path_falls_back_to_default_when_unset() {
        std::env::remove_var("IV_CACHE_PATH_TEST_PROBE");
        let default = PathBuf::from("storage/.iv_atm_cache.json");
        assert_eq!(env_path("IV_CACHE_PATH_TEST_PROBE", &default), default);
    }
}
