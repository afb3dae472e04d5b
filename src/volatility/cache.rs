//! Rolling IV-sample cache persisted to storage (§4.2 IV cache).

use std::path::Path;

use chrono::{DateTime, Duration, Utc};

use crate::error::Result;
use crate::memory::store::{load_json_or_default, save_json_atomic};
use crate::payoff::normalize_iv;
use crate::types::IvSample;

/// Upserts `sample` by timestamp, drops entries older than `lookback_days`,
/// sorts ascending, and truncates to the most recent `max_samples`.
pub fn record(path: &Path, sample: IvSample, now: DateTime<Utc>, lookback_days: i64, max_samples: usize) -> Result<Vec<IvSample>> {
    let mut samples: Vec<IvSample> = load_json_or_default(path)?;

    let normalized = IvSample {
        ts_iso: sample.ts_iso.clone(),
        iv_atm: normalize_iv(sample.iv_atm),
    };
    samples.retain(|s| s.ts_iso != normalized.ts_iso);
    samples.push(normalized);

    let cutoff = now - Duration::days(lookback_days);
    samples.retain(|s| s.timestamp().is_some_and(|ts| ts >= cutoff));
    samples.sort_by(|a, b| a.ts_iso.cmp(&b.ts_iso));
    if samples.len() > max_samples {
        let drop = samples.len() - max_samples;
        samples.drain(0..drop);
    }

    save_json_atomic(path, &samples)?;
    Ok(samples)
}

pub fn load(path: &Path) -> Result<Vec<IvSample>> {
    load_json_or_default(path)
}

/// `compute_percentile` (§4.2): percentile-rank of `current_iv` among
/// samples within `lookback_days` of `as_of`.
pub fn compute_percentile(current_iv: f64, samples: &[IvSample], lookback_days: i64, as_of: DateTime<Utc>) -> (Option<f64>, usize, bool) {
    let cutoff = as_of - Duration::days(lookback_days);
    let windowed: Vec<f64> = samples
        .iter()
        .filter(|s| s.timestamp().is_some_and(|ts| ts >= cutoff))
        .map(|s| s.iv_atm)
        .collect();

    if windowed.is_empty() {
        return (None, 0, true);
    }

    let current = normalize_iv(current_iv);
    let le_count = windowed.iter().filter(|&&iv| iv <= current).count();
    let percentile = 100.0 * le_count as f64 / windowed.len() as f64;
    (Some(percentile), windowed.len(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    fn sample(day: u32, iv: f64) -> IvSample {
        IvSample { ts_iso: ts(day).to_rfc3339(), iv_atm: iv }
    }

    #[test]
    fn record_upserts_sorts_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iv.json");
        record(&path, sample(3, 0.2), ts(10), 60, 3).unwrap();
        record(&path, sample(1, 0.1), ts(10), 60, 3).unwrap();
        record(&path, sample(2, 0.15), ts(10), 60, 3).unwrap();
        let samples = record(&path, sample(4, 0.25), ts(10), 60, 3).unwrap();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].ts_iso, ts(2).to_rfc3339());
        assert_eq!(samples.last().unwrap().ts_iso, ts(4).to_rfc3339());
    }

    #[test]
    fn record_drops_entries_outside_lookback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iv.json");
        record(&path, sample(1, 0.1), ts(1), 60, 100).unwrap();
        let samples = record(&path, sample(200, 0.2), ts(200), 60, 100).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].ts_iso, ts(200).to_rfc3339());
    }

    #[test]
    fn percentile_is_null_when_no_samples_in_window() {
        let (pctl, n, insufficient) = compute_percentile(0.2, &[], 60, ts(10));
        assert!(pctl.is_none());
        assert_eq!(n, 0);
        assert!(insufficient);
    }

    #[test]
    fn percentile_ranks_current_iv_against_window() {
        let samples = vec![sample(1, 0.1), sample(2, 0.2), sample(3, 0.3), sample(4, 0.4)];
        let (pctl, n, insufficient) = compute_percentile(0.25, &samples, 60, ts(10));
        assert_eq!(n, 4);
        assert!(!insufficient);
        assert!((pctl.unwrap() - 50.0).abs() < 1e-9);
    }
}
