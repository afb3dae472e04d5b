//! DTE bucket resolution and the measured-move-completion gate (§4.4).

pub const DTE_TARGETS: [u32; 5] = [2, 7, 14, 30, 45];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DteResolution {
    pub target: u32,
    pub selected: Option<u32>,
    pub distance: Option<u32>,
}

/// `resolve_nearest_dte_buckets` (§4.4): for each target, the closest
/// available DTE, ties broken toward the lower DTE.
pub fn resolve_nearest_dte_buckets(available_dtes: &[u32]) -> Vec<DteResolution> {
    DTE_TARGETS
        .into_iter()
        .map(|target| {
            if available_dtes.is_empty() {
                return DteResolution { target, selected: None, distance: None };
            }
            let selected = *available_dtes
                .iter()
                .min_by_key(|&&dte| (dte.abs_diff(target), dte))
                .expect("non-empty checked above");
            DteResolution { target, selected: Some(selected), distance: Some(selected.abs_diff(target)) }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmcDirection {
    BullPut,
    BearCall,
}

pub struct MmcInputs {
    pub spot: f64,
    pub ema20: f64,
    pub em_1sd: f64,
    pub z_score: f64,
    pub macd_hist: f64,
    pub macd_hist_prev: f64,
    pub direction: MmcDirection,
    pub dte: u32,
    pub enforce_not_still_extending: bool,
    pub prev_stretch: Option<f64>,
}

fn nearest_bucket(dte: u32) -> u32 {
    *DTE_TARGETS.iter().min_by_key(|&&b| b.abs_diff(dte)).expect("DTE_TARGETS is non-empty")
}

fn z_threshold(bucket: u32) -> f64 {
    match bucket {
        45 => 1.0,
        30 => 1.1,
        14 => 1.3,
        7 => 1.5,
        _ => 1.7,
    }
}

fn mmc_stretch_threshold(bucket: u32) -> f64 {
    match bucket {
        45 => 0.85,
        30 => 1.0,
        14 => 1.25,
        7 => 1.55,
        _ => 1.9,
    }
}

/// `measured_move_completion_pass` (§4.4).
pub fn measured_move_completion_pass(inputs: &MmcInputs) -> bool {
    let bucket = nearest_bucket(inputs.dte);
    let z_thr = z_threshold(bucket);
    let stretch_thr = mmc_stretch_threshold(bucket);

    let stretch = if inputs.em_1sd > 0.0 { (inputs.spot - inputs.ema20).abs() / inputs.em_1sd } else { 0.0 };

    let z_ok = inputs.z_score.abs() >= z_thr;
    let stretch_ok = stretch >= stretch_thr;
    let momentum_ok = match inputs.direction {
        MmcDirection::BullPut => inputs.macd_hist > inputs.macd_hist_prev,
        MmcDirection::BearCall => inputs.macd_hist < inputs.macd_hist_prev,
    };
    let sign_ok = match inputs.direction {
        MmcDirection::BullPut => inputs.z_score <= 0.0,
        MmcDirection::BearCall => inputs.z_score >= 0.0,
    };

    if !(z_ok && stretch_ok && momentum_ok && sign_ok) {
        return false;
    }

    if inputs.dte <= 7 && inputs.enforce_not_still_extending {
        if let Some(prev_stretch) = inputs.prev_stretch {
            return stretch <= prev_stretch;
        }
    }

    true
}
