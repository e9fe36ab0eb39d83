use crate::diagnostics::Diagnostic;
use crate::enums::{
    AnomalyMethod, ClusteringAlgorithm, CorrelationKind, CorrelationMethod, ForecastModel,
    PatternType, RegimeLevel, Severity, VolatilityModel,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---===[ Forecasting ]===---

/// Error metrics of a model scored on the held-out tail of the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    /// Mean absolute percentage error on the holdout, in percent.
    pub mape: f64,
    pub mae: f64,
    pub rmse: f64,
    /// Standard deviation of the in-sample one-step residuals of the final fit.
    pub residual_std: f64,
    pub holdout_len: usize,
    pub train_len: usize,
}

/// Output of one forecasting model, or of the ensemble combination (`"ensemble"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub model_name: String,
    pub point_forecast: Vec<f64>,
    pub lower_bound: Vec<f64>,
    pub upper_bound: Vec<f64>,
    pub fit_diagnostics: FitDiagnostics,
}

impl ForecastResult {
    pub fn horizon(&self) -> usize {
        self.point_forecast.len()
    }

    /// `lower <= point <= upper` at every step, with every value finite.
    pub fn is_well_formed(&self) -> bool {
        let h = self.point_forecast.len();
        h > 0
            && self.lower_bound.len() == h
            && self.upper_bound.len() == h
            && (0..h).all(|i| {
                let (l, p, u) = (self.lower_bound[i], self.point_forecast[i], self.upper_bound[i]);
                l.is_finite() && p.is_finite() && u.is_finite() && l <= p && p <= u
            })
    }
}

/// A model that was requested but left out of the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedModel {
    pub model_name: ForecastModel,
    pub reason: String,
}

/// A weighted combination of several models' forecasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleForecast {
    pub members: Vec<ForecastResult>,
    pub weights: BTreeMap<ForecastModel, f64>,
    pub combined: ForecastResult,
    pub confidence_level: f64,
    pub season_length: Option<usize>,
    pub excluded: Vec<ExcludedModel>,
    pub diagnostics: Vec<Diagnostic>,
}

// ---===[ Patterns ]===---

/// A detected periodic component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern_type: PatternType,
    /// Period in time steps; always greater than 1.
    pub period: f64,
    /// Strength in `[0, 1]`.
    pub strength: f64,
    /// Angular position of the seasonal peak within a cycle, in radians `[0, 2π)`.
    pub phase: f64,
}

// ---===[ Volatility ]===---

/// Risk measures derived from a fitted volatility model.
///
/// Losses are reported as positive numbers in the units of the analyzed changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub confidence_level: f64,
    pub value_at_risk: f64,
    pub expected_shortfall: f64,
    pub historical_value_at_risk: f64,
    pub historical_expected_shortfall: f64,
    pub mean_return: f64,
    pub reward_to_risk: f64,
}

/// A contiguous span of similar volatility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub level: RegimeLevel,
    /// First index of the span (inclusive).
    pub start: usize,
    /// Last index of the span (inclusive).
    pub end: usize,
    pub mean_volatility: f64,
}

/// Time-varying dispersion estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityEstimate {
    /// One non-negative value per input observation.
    pub series: Vec<f64>,
    /// The model that produced `series`, which may differ from the requested one.
    pub model: VolatilityModel,
    pub requested_model: VolatilityModel,
    pub persistence: f64,
    pub forecast: Vec<f64>,
    pub risk_metrics: Option<RiskMetrics>,
    pub regimes: Option<Vec<Regime>>,
    pub diagnostics: Vec<Diagnostic>,
}

// ---===[ Correlation ]===---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPair {
    pub a: usize,
    pub b: usize,
    pub correlation: f64,
    pub p_value: f64,
}

/// Graph-level statistics of the thresholded correlation matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub threshold: f64,
    pub edge_count: usize,
    pub density: f64,
    pub degrees: Vec<usize>,
    pub components: usize,
    /// Edges sorted by absolute correlation, strongest first.
    pub strong_pairs: Vec<CorrelatedPair>,
}

/// Variables grouped by correlation distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorGroups {
    pub k: usize,
    pub labels: Vec<usize>,
    pub validation_score: f64,
}

/// Pairwise dependency structure over N series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub method: CorrelationMethod,
    pub kind: CorrelationKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// N×N, symmetric, unit diagonal.
    pub matrix: Vec<Vec<f64>>,
    pub p_values: Vec<Vec<f64>>,
    pub observations: usize,
    pub network: Option<NetworkSummary>,
    pub factor_groups: Option<FactorGroups>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CorrelationMatrix {
    pub fn size(&self) -> usize {
        self.matrix.len()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.matrix.get(i).and_then(|row| row.get(j)).copied()
    }
}

// ---===[ Clustering ]===---

/// Grouping of M observations into K groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub algorithm: ClusteringAlgorithm,
    pub k: usize,
    /// One label in `[0, k)` per observation.
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// Mean silhouette; 0 when `k == 1`.
    pub validation_score: f64,
    /// Soft assignment probabilities (distribution-based clustering only).
    pub probabilities: Option<Vec<Vec<f64>>>,
    /// Points density-based clustering considered noise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub noise: Vec<bool>,
    pub converged: bool,
    pub diagnostics: Vec<Diagnostic>,
}

// ---===[ Anomalies ]===---

/// A flagged observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub index: usize,
    pub score: f64,
    pub severity: Severity,
    pub method: AnomalyMethod,
    pub is_contextual: bool,
    pub is_collective: bool,
}
