#![allow(
    clippy::float_cmp,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]

pub mod candidates;
pub mod config;
pub mod dte;
pub mod error;
pub mod freshness;
pub mod ids;
pub mod memory;
pub mod payoff;
pub mod pipeline;
pub mod polling;
pub mod rank;
pub mod session;
pub mod types;
pub mod volatility;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use pipeline::evaluate;
pub use types::{DecisionOutput, DecisionStatus, Snapshot};
