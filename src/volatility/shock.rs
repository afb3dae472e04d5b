//! `detect_vol_shock` (§4.2): flags a sudden move relative to the expected
//! one-standard-deviation move, or a VIX jump.

use crate::config::VolatilityConfig;
use crate::types::{ShockResult, ShockSeverity};

const SEVERITY_MULTIPLIER: f64 = 1.5;

/// `em_1sd = spot * iv_atm * sqrt(dte / 365)`.
pub fn expected_move_1sd(spot: f64, iv_atm_raw: f64, dte: f64) -> f64 {
    let iv = crate::payoff::normalize_iv(iv_atm_raw);
    spot * iv * (dte / 365.0).max(0.0).sqrt()
}

pub fn detect_vol_shock(spot: f64, prev_spot: f64, em_1sd: f64, vix: f64, prev_vix: f64, cfg: &VolatilityConfig) -> ShockResult {
    let move_pct_em_1sd = if em_1sd > 0.0 { (spot - prev_spot).abs() / em_1sd } else { 0.0 };
    let vix_delta = vix - prev_vix;

    let move_triggered = move_pct_em_1sd >= cfg.shock_move_pct_em1sd;
    let vix_triggered = vix_delta >= cfg.shock_vix_jump;
    let triggered = move_triggered || vix_triggered;

    let severity = if move_pct_em_1sd >= cfg.shock_move_pct_em1sd * SEVERITY_MULTIPLIER
        || vix_delta >= cfg.shock_vix_jump * SEVERITY_MULTIPLIER
    {
        ShockSeverity::Block
    } else if triggered {
        ShockSeverity::Warn
    } else {
        ShockSeverity::None
    };

    ShockResult {
        triggered,
        severity,
        move_pct_em_1sd,
        vix_delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_shock_under_both_thresholds() {
        let cfg = VolatilityConfig::default();
        let result = detect_vol_shock(100.0, 99.9, 2.0, 16.0, 15.9, &cfg);
        assert!(!result.triggered);
        assert_eq!(result.severity, ShockSeverity::None);
    }

    #[test]
    fn move_past_threshold_warns() {
        let cfg = VolatilityConfig::default();
        // move_pct = 1.0 / 2.0 = 0.5 >= 0.35 but < 0.525 (1.5x)
        let result = detect_vol_shock(101.0, 100.0, 2.0, 16.0, 15.9, &cfg);
        assert!(result.triggered);
        assert_eq!(result.severity, ShockSeverity::Warn);
    }

    #[test]
    fn large_move_blocks() {
        let cfg = VolatilityConfig::default();
        // move_pct = 1.2 / 2.0 = 0.6 >= 0.525
        let result = detect_vol_shock(101.2, 100.0, 2.0, 16.0, 15.9, &cfg);
        assert_eq!(result.severity, ShockSeverity::Block);
    }

    #[test]
    fn vix_jump_alone_triggers_shock() {
        let cfg = VolatilityConfig::default();
        let result = detect_vol_shock(100.0, 100.0, 2.0, 20.0, 17.5, &cfg);
        assert!(result.triggered);
        assert!(result.vix_delta >= cfg.shock_vix_jump);
    }

    #[test]
    fn expected_move_scales_with_sqrt_time() {
        let em_30 = expected_move_1sd(5000.0, 0.16, 30.0);
        let em_120 = expected_move_1sd(5000.0, 0.16, 120.0);
        assert!((em_120 / em_30 - 2.0).abs() < 1e-9);
    }
}
