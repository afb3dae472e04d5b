use sha1::{Digest, Sha1};

use super::blackscholes::normalize_iv;
use super::iron;
use super::vertical::{self, SpreadSide};

const RISK_FREE_RATE: f64 = 0.045;
const DEFAULT_PATHS: usize = 2_000;

/// SplitMix64 seeded from the SHA-1 digest of a caller-supplied key (§9
/// Design Notes). Two independent implementations that hash the same key
/// and draw in the same order agree on every sampled path, bit-for-bit.
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn seeded(seed_key: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(seed_key.as_bytes());
        let digest = hasher.finalize();
        let seed = u64::from_be_bytes(digest[..8].try_into().expect("sha1 digest is 20 bytes"));
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform sample in `(0, 1]`, avoiding exact zero so `ln()` stays finite.
    fn next_open01(&mut self) -> f64 {
        let bits = self.next_u64() >> 11;
        let unit = bits as f64 * (1.0 / (1u64 << 53) as f64);
        (1.0 - unit).max(f64::MIN_POSITIVE)
    }

    /// Box-Muller transform, two uniforms in, one standard normal out.
    fn next_standard_normal(&mut self) -> f64 {
        let u1 = self.next_open01();
        let u2 = self.next_open01();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

fn sample_terminal_prices(spot: f64, dte: f64, iv_raw: f64, seed_key: &str, paths: usize) -> Vec<f64> {
    let iv = normalize_iv(iv_raw);
    let t = (dte / 365.0).max(0.0);
    let drift = (RISK_FREE_RATE - 0.5 * iv * iv) * t;
    let vol = iv * t.sqrt();
    let mut rng = SplitMix64::seeded(seed_key);
    (0..paths)
        .map(|_| (spot.ln() + drift + vol * rng.next_standard_normal()).exp())
        .collect()
}

/// Deterministic Monte-Carlo expected value of a vertical spread at
/// expiration, scaled by `multiplier * contracts` (§4.1 `estimate_ev_vertical`).
pub fn estimate_ev_vertical(
    side: SpreadSide,
    short: f64,
    long: f64,
    premium: f64,
    contracts: u32,
    multiplier: f64,
    spot: f64,
    dte: f64,
    iv_raw: f64,
    seed_key: &str,
) -> f64 {
    let paths = sample_terminal_prices(spot, dte, iv_raw, seed_key, DEFAULT_PATHS);
    let scale = multiplier * f64::from(contracts);
    let total: f64 = paths
        .iter()
        .map(|&underlying| vertical::expiration_pnl(side, short, long, premium, underlying) * scale)
        .sum();
    total / paths.len() as f64
}

/// Deterministic Monte-Carlo expected value of an iron condor/fly at
/// expiration, scaled by `multiplier * contracts` (§4.1 `estimate_ev_iron`).
pub fn estimate_ev_iron(
    short_put: f64,
    short_call: f64,
    width: f64,
    credit: f64,
    contracts: u32,
    multiplier: f64,
    spot: f64,
    dte: f64,
    iv_raw: f64,
    seed_key: &str,
) -> f64 {
    let paths = sample_terminal_prices(spot, dte, iv_raw, seed_key, DEFAULT_PATHS);
    let scale = multiplier * f64::from(contracts);
    let total: f64 = paths
        .iter()
        .map(|&underlying| iron::expiration_pnl(short_put, short_call, width, credit, underlying) * scale)
        .sum();
    total / paths.len() as f64
}
