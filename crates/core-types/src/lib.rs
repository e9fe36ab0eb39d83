//! # Core Types
//!
//! The shared vocabulary of the analytics workspace: the input series, every
//! result entity the analyzers return, the closed enums that name models and
//! methods, and the validation gate all analyzers run first.
//!
//! This crate has no logic beyond validation and simple accessors.

pub mod diagnostics;
pub mod enums;
pub mod error;
pub mod series;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use diagnostics::Diagnostic;
pub use enums::{
    AnomalyMethod, ClusteringAlgorithm, CorrelationAnalysisType, CorrelationKind,
    CorrelationMethod, ForecastModel, Linkage, PatternMethod, PatternType, RegimeLevel,
    ReturnsTransform, Severity, VolatilityModel,
};
pub use error::ValidationError;
pub use series::{
    validate, validate_aligned, validate_features, validate_variation, TimeSeries,
    VARIANCE_EPSILON,
};
pub use structs::{
    AnomalyRecord, ClusterAssignment, CorrelatedPair, CorrelationMatrix, EnsembleForecast,
    ExcludedModel, FactorGroups, FitDiagnostics, ForecastResult, NetworkSummary, Pattern,
    Regime, RiskMetrics, VolatilityEstimate,
};
