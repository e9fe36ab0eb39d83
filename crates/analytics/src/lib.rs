//! # Chess Analytics Engine
//!
//! This crate turns numeric series from the chess-statistics platform (rating
//! histories, activity counts, performance indices) into forecasts, periodic
//! patterns, volatility and risk estimates, correlation structures, cluster
//! assignments and anomaly flags.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure logic crate. It performs no I/O and depends
//!   only on `core-types`, `configuration` and `risk` (Layer 0).
//! - **Stateless Analyzers:** Every analyzer is built from a validated options record
//!   and keeps no state between calls. The only shared state is the advisory
//!   `ResultCache` owned by the `AnalyticsEngine`.
//! - **Degrade, Don't Fail:** Invalid input and invalid options are typed errors.
//!   A fit that does not converge still produces a result and records a
//!   `Diagnostic` saying so.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: The façade that runs single analyses, tagged requests and batches.
//! - `ForecastEngine`, `PatternDetector`, `VolatilityAnalyzer`, `CorrelationAnalyzer`,
//!   `ClusteringAnalyzer`, `AnomalyDetector`: The individual analyzers.
//! - `AnalysisRequest` / `AnalysisReport`: The request and envelope types.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod anomaly;
pub mod cache;
pub mod clustering;
pub mod correlation;
pub mod engine;
pub mod error;
pub mod forecast;
mod optimize;
pub mod patterns;
pub mod report;
mod stats;
pub mod volatility;

// Re-export the key components to create a clean, public-facing API.
pub use anomaly::{AnomalyDetector, AnomalyInput};
pub use cache::{CacheStats, ResultCache};
pub use clustering::ClusteringAnalyzer;
pub use correlation::CorrelationAnalyzer;
pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use forecast::ForecastEngine;
pub use patterns::PatternDetector;
pub use report::{
    AnalysisDetail, AnalysisKind, AnalysisReport, AnalysisRequest, BatchEntry, BatchOutcome,
    BatchRequest, Confidence,
};
pub use volatility::VolatilityAnalyzer;
