//! Deterministic ranker (§4.6): scores surviving candidates and produces a
//! total order with no randomness and no ties left unresolved.

use std::collections::BTreeMap;

use crate::types::{CandidateCard, RankedCandidate};

fn delta_band(dte_bucket: u32) -> (f64, f64) {
    match dte_bucket {
        45 => (0.18, 0.28),
        30 => (0.16, 0.26),
        14 => (0.12, 0.20),
        7 => (0.06, 0.12),
        _ => (0.03, 0.07),
    }
}

fn nearest_bucket(dte: u32) -> u32 {
    crate::dte::DTE_TARGETS.iter().min_by_key(|&&b| b.abs_diff(dte)).copied().unwrap_or(7)
}

struct Score {
    candidate_id: String,
    delta_fit: f64,
    credit_per_width: f64,
    gamma_penalty: f64,
}

/// `rank_candidates` (§4.6). `apply_gamma_penalty` mirrors
/// `prob_max_gamma_penalty`: when false, every candidate's gamma penalty is
/// treated as zero, so ranking falls back to delta-fit/credit-per-width only.
pub fn rank_candidates(cards: &[CandidateCard], apply_gamma_penalty: bool) -> Vec<RankedCandidate> {
    let mut scores: Vec<Score> = cards
        .iter()
        .map(|card| {
            let bucket = nearest_bucket(card.dte);
            let (lo, hi) = delta_band(bucket);
            let mid = (lo + hi) / 2.0;
            let short_delta = card.short_leg().map(|l| l.delta.abs()).unwrap_or(0.0);
            let delta_fit = (short_delta - mid).abs();
            let credit_per_width = if card.width > 0.0 { card.adjusted_premium / card.width } else { 0.0 };
            let raw_gamma = card.short_leg().and_then(|l| l.gamma).map(f64::abs).unwrap_or(0.0);
            let gamma_penalty = if apply_gamma_penalty {
                if card.dte > 14 {
                    raw_gamma * 0.5
                } else {
                    raw_gamma
                }
            } else {
                0.0
            };
            Score { candidate_id: card.candidate_id.clone(), delta_fit, credit_per_width, gamma_penalty }
        })
        .collect();

    scores.sort_by(|a, b| {
        a.delta_fit
            .partial_cmp(&b.delta_fit)
            .expect("delta_fit is finite")
            .then_with(|| b.credit_per_width.partial_cmp(&a.credit_per_width).expect("credit_per_width is finite"))
            .then_with(|| a.gamma_penalty.partial_cmp(&b.gamma_penalty).expect("gamma_penalty is finite"))
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| RankedCandidate {
            rank: i as u32 + 1,
            candidate_id: s.candidate_id,
            delta_fit: s.delta_fit,
            credit_per_width: s.credit_per_width,
            gamma_penalty: s.gamma_penalty,
        })
        .collect()
}

/// Convenience lookup from the ranked list back to rank position, used by
/// the pipeline to pick the primary candidate without re-sorting.
pub fn rank_index(ranked: &[RankedCandidate]) -> BTreeMap<String, u32> {
    ranked.iter().map(|r| (r.candidate_id.clone(), r.rank)).collect()
}
