//! # Risk
//!
//! Tail-risk measures (value-at-risk and expected shortfall) for a series of
//! changes, from a conditional normal distribution and from the empirical
//! distribution.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** depends only on `core-types`. It knows nothing about how
//!   the conditional volatility it is given was estimated.
//!
//! ## Public API
//!
//! - `TailRiskModel`: the trait both estimators implement.
//! - `ParametricRisk`, `HistoricalRisk`: the two estimators.
//! - `risk_metrics`: builds a complete `RiskMetrics` record.

pub mod error;
pub mod metrics;

pub use error::RiskError;
pub use metrics::{risk_metrics, HistoricalRisk, ParametricRisk, TailRiskModel, SIGMA_FLOOR};
