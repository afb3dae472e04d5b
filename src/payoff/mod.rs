//! Closed-form payoff/probability core and the Monte-Carlo EV estimator
//! that sits alongside it (§4.1).

pub mod blackscholes;
pub mod iron;
pub mod montecarlo;
pub mod vertical;

pub use blackscholes::{compute_pop_and_touch, normal_cdf, normalize_iv, PopAndTouch};
pub use iron::{compute_iron_payoff, IronPayoffResult};
pub use montecarlo::{estimate_ev_iron, estimate_ev_vertical};
pub use vertical::{build_expiration_payoff_curve, compute_vertical_payoff, PayoffPoint, PayoffResult, SpreadSide};
