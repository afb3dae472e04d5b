//! `apply_vol_policy` (§4.2): per-regime allow-list of DTE buckets plus
//! per-bucket threshold adjustments.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::VolatilityConfig;
use crate::types::{BucketAdjustment, VolPolicy, VolRegime};

pub fn apply_vol_policy(regime: VolRegime, cfg: &VolatilityConfig) -> VolPolicy {
    match regime {
        VolRegime::VolNormal => VolPolicy {
            regime,
            allowed_dte_buckets: BTreeSet::from([2, 7, 14, 30, 45]),
            adjustments: BTreeMap::new(),
        },
        VolRegime::VolSuppressed => {
            let mut adjustments = BTreeMap::new();
            adjustments.insert(
                2,
                BucketAdjustment {
                    delta_band_shift: -0.01,
                    min_sd_shift: 0.10,
                    min_credit_pct_shift: 0.01,
                },
            );
            adjustments.insert(
                7,
                BucketAdjustment {
                    min_sd_shift: 0.05,
                    ..Default::default()
                },
            );
            VolPolicy {
                regime,
                allowed_dte_buckets: BTreeSet::from([2, 7, 14, 30]),
                adjustments,
            }
        }
        VolRegime::VolExpanding => {
            let mut allowed = BTreeSet::from([7, 14, 30, 45]);
            if cfg.policy_expanding_allow_2dte {
                allowed.insert(2);
            }
            let mut adjustments = BTreeMap::new();
            for bucket in [7, 14, 30] {
                adjustments.insert(bucket, BucketAdjustment { min_sd_shift: 0.10, ..Default::default() });
            }
            VolPolicy { regime, allowed_dte_buckets: allowed, adjustments }
        }
        VolRegime::VolExtreme => {
            let allowed = if cfg.policy_extreme_block_all {
                BTreeSet::new()
            } else {
                BTreeSet::from([30, 45])
            };
            let mut adjustments = BTreeMap::new();
            for bucket in [30, 45] {
                adjustments.insert(
                    bucket,
                    BucketAdjustment {
                        min_sd_shift: 0.20,
                        min_credit_pct_shift: 0.02,
                        ..Default::default()
                    },
                );
            }
            VolPolicy { regime, allowed_dte_buckets: allowed, adjustments }
        }
        VolRegime::Unknown => VolPolicy {
            regime,
            allowed_dte_buckets: BTreeSet::new(),
            adjustments: BTreeMap::new(),
        },
    }
}
