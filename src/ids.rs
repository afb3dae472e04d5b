//! Content-addressed and time-ordered ID generation (§6).

use rand::RngCore;
use sha1::{Digest, Sha1};

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Base-36 encoding of a non-negative integer, lowercase, no padding.
/// Used for the time component of `trade_id`/`event_id` (§6); there is no
/// third-party base36 crate in use here so this is a small hand-rolled
/// utility rather than a dependency for six lines of arithmetic.
pub fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

fn random_hex(len_bytes: usize) -> String {
    let mut buf = vec![0u8; len_bytes];
    rand::rng().fill_bytes(&mut buf);
    hex(&buf)
}

/// `candidate_id = "cand_" + first16(hex(sha1(geometry_key)))`.
pub fn candidate_id(
    dte_bucket: u32,
    direction: &str,
    expiration_yyyy_mm_dd: &str,
    short: f64,
    long: f64,
    width: f64,
) -> String {
    let key = format!(
        "{dte_bucket}|{direction}|{expiration_yyyy_mm_dd}|{:.2}|{:.2}|{:.0}",
        round_cents(short),
        round_cents(long),
        width.round()
    );
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    format!("cand_{}", &hex(&digest)[..16])
}

fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `trade_id = "trd_" + base36(now_ms) + "_" + 6 random hex chars`.
pub fn trade_id(now_ms: i64) -> String {
    format!("trd_{}_{}", base36(now_ms.max(0) as u64), &random_hex(4)[..6])
}

/// `event_id = "evt_" + base36(now_ms) + "_" + 8 random hex chars`.
pub fn event_id(now_ms: i64) -> String {
    format!("evt_{}_{}", base36(now_ms.max(0) as u64), &random_hex(4)[..8])
}

/// `run_id = "dec_" + first12(hex(sha1(as_of|source|data_mode|session|candidate_count)))`.
pub fn run_id(as_of: &str, source: &str, data_mode: &str, session: &str, candidate_count: usize) -> String {
    let key = format!("{as_of}|{source}|{data_mode}|{session}|{candidate_count}");
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    format!("dec_{}", &hex(&digest)[..12])
}
