//! Per-analyzer option records.
//!
//! Every field has a documented default so a caller (or a TOML section) only
//! needs to name what it changes. `validate()` checks each record on its own;
//! checks that depend on the input (such as `k` against the number of
//! observations) happen when the analyzer is called.

use crate::error::ConfigError;
use core_types::enums::{
    AnomalyMethod, ClusteringAlgorithm, CorrelationAnalysisType, CorrelationMethod, ForecastModel,
    Linkage, PatternMethod, PatternType, ReturnsTransform, VolatilityModel,
};
use serde::{Deserialize, Serialize};

fn check_probability(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value < 1.0) {
        return Err(ConfigError::invalid(format!(
            "{} must lie strictly between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(format!("{} must be greater than 0", name)));
    }
    Ok(())
}

// ---===[ Forecasting ]===---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastOptions {
    /// Models to fit. Defaults to every model.
    pub models: Vec<ForecastModel>,
    pub horizon: usize,
    pub confidence_level: f64,
    /// Season length in time steps. When absent it is detected from the data.
    pub season_length: Option<usize>,
    /// Fraction of the history held out for scoring.
    pub holdout_ratio: f64,
    /// Minimum ensemble weight of any scored model.
    pub weight_floor: f64,
    /// Geometric widening of the interval per forecast step.
    pub interval_growth: f64,
    pub arima_p: usize,
    pub arima_d: usize,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            models: ForecastModel::ALL.to_vec(),
            horizon: 7,
            confidence_level: 0.95,
            season_length: None,
            holdout_ratio: 0.2,
            weight_floor: 0.05,
            interval_growth: 0.05,
            arima_p: 2,
            arima_d: 1,
        }
    }
}

impl ForecastOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::invalid("at least one forecast model is required"));
        }
        check_positive("horizon", self.horizon)?;
        check_probability("confidence_level", self.confidence_level)?;
        if !(self.holdout_ratio > 0.0 && self.holdout_ratio <= 0.5) {
            return Err(ConfigError::invalid(format!(
                "holdout_ratio must lie in (0, 0.5], got {}",
                self.holdout_ratio
            )));
        }
        if !(0.0..1.0).contains(&self.weight_floor) {
            return Err(ConfigError::invalid(format!(
                "weight_floor must lie in [0, 1), got {}",
                self.weight_floor
            )));
        }
        if !(self.interval_growth >= 0.0 && self.interval_growth.is_finite()) {
            return Err(ConfigError::invalid("interval_growth must be non-negative"));
        }
        if let Some(season) = self.season_length {
            if season < 2 {
                return Err(ConfigError::invalid("season_length must be at least 2"));
            }
        }
        if self.arima_d > 2 {
            return Err(ConfigError::invalid("arima_d must be 0, 1 or 2"));
        }
        if self.arima_p > 10 {
            return Err(ConfigError::invalid("arima_p must be at most 10"));
        }
        Ok(())
    }
}

// ---===[ Patterns ]===---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternOptions {
    pub method: PatternMethod,
    /// Pattern types to report. Empty means every type.
    pub pattern_types: Vec<PatternType>,
    pub min_strength: f64,
    /// Robust clipping threshold in MAD units.
    pub clip_threshold: f64,
    /// Longest period scanned. Defaults to half the series length.
    pub max_period: Option<usize>,
    /// Spacing of observations in days, used when the series has no timestamps.
    pub sampling_interval_days: f64,
    pub max_patterns: usize,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            method: PatternMethod::Autocorrelation,
            pattern_types: Vec::new(),
            min_strength: 0.3,
            clip_threshold: 3.5,
            max_period: None,
            sampling_interval_days: 1.0,
            max_patterns: 5,
        }
    }
}

impl PatternOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_strength) {
            return Err(ConfigError::invalid(format!(
                "min_strength must lie in [0, 1], got {}",
                self.min_strength
            )));
        }
        if !(self.clip_threshold > 0.0) {
            return Err(ConfigError::invalid("clip_threshold must be positive"));
        }
        if !(self.sampling_interval_days > 0.0 && self.sampling_interval_days.is_finite()) {
            return Err(ConfigError::invalid("sampling_interval_days must be positive"));
        }
        if let Some(max_period) = self.max_period {
            if max_period < 2 {
                return Err(ConfigError::invalid("max_period must be at least 2"));
            }
        }
        check_positive("max_patterns", self.max_patterns)
    }

    pub fn accepts(&self, pattern_type: PatternType) -> bool {
        self.pattern_types.is_empty() || self.pattern_types.contains(&pattern_type)
    }
}

// ---===[ Volatility ]===---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityOptions {
    pub model: VolatilityModel,
    pub returns: ReturnsTransform,
    pub horizon: usize,
    pub confidence_level: f64,
    /// EWMA decay factor.
    pub lambda: f64,
    /// Rolling window of the historical model.
    pub window: usize,
    pub risk_metrics: bool,
    pub regimes: bool,
    pub min_regime_length: usize,
    pub clip_threshold: f64,
    pub max_iterations: usize,
}

impl Default for VolatilityOptions {
    fn default() -> Self {
        Self {
            model: VolatilityModel::Ewma,
            returns: ReturnsTransform::Difference,
            horizon: 5,
            confidence_level: 0.95,
            lambda: 0.94,
            window: 20,
            risk_metrics: true,
            regimes: false,
            min_regime_length: 5,
            clip_threshold: 3.5,
            max_iterations: 500,
        }
    }
}

impl VolatilityOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("horizon", self.horizon)?;
        check_probability("confidence_level", self.confidence_level)?;
        check_probability("lambda", self.lambda)?;
        if self.window < 2 {
            return Err(ConfigError::invalid("window must be at least 2"));
        }
        check_positive("min_regime_length", self.min_regime_length)?;
        check_positive("max_iterations", self.max_iterations)?;
        if !(self.clip_threshold > 0.0) {
            return Err(ConfigError::invalid("clip_threshold must be positive"));
        }
        Ok(())
    }
}

// ---===[ Correlation ]===---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationOptions {
    pub method: CorrelationMethod,
    pub analysis_type: CorrelationAnalysisType,
    /// Minimum absolute correlation of a network edge.
    pub min_correlation: f64,
    /// Maximum p-value of a network edge.
    pub significance: f64,
    /// Optional names of the input series.
    pub labels: Vec<String>,
    /// Number of variable groups for the hierarchical-factor mode.
    pub factor_groups: Option<usize>,
    pub max_pairs: usize,
}

impl Default for CorrelationOptions {
    fn default() -> Self {
        Self {
            method: CorrelationMethod::Pearson,
            analysis_type: CorrelationAnalysisType::Pairwise,
            min_correlation: 0.5,
            significance: 0.05,
            labels: Vec::new(),
            factor_groups: None,
            max_pairs: 10,
        }
    }
}

impl CorrelationOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_correlation) {
            return Err(ConfigError::invalid(format!(
                "min_correlation must lie in [0, 1], got {}",
                self.min_correlation
            )));
        }
        check_probability("significance", self.significance)?;
        if let Some(groups) = self.factor_groups {
            check_positive("factor_groups", groups)?;
        }
        Ok(())
    }
}

// ---===[ Clustering ]===---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringOptions {
    pub algorithm: ClusteringAlgorithm,
    /// Number of clusters. Chosen automatically (2..=max_k) when absent.
    pub k: Option<usize>,
    pub max_k: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// k-means restarts; the lowest-inertia run wins.
    pub n_init: usize,
    pub linkage: Linkage,
    /// Dendrogram cut height for hierarchical clustering.
    pub cut_height: Option<f64>,
    /// Neighbourhood radius for density clustering. Estimated when absent.
    pub eps: Option<f64>,
    pub min_points: usize,
    pub standardize: bool,
    pub seed: Option<u64>,
}

impl Default for ClusteringOptions {
    fn default() -> Self {
        Self {
            algorithm: ClusteringAlgorithm::KMeans,
            k: None,
            max_k: 8,
            max_iterations: 300,
            tolerance: 1e-6,
            n_init: 4,
            linkage: Linkage::Ward,
            cut_height: None,
            eps: None,
            min_points: 4,
            standardize: true,
            seed: None,
        }
    }
}

impl ClusteringOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(k) = self.k {
            check_positive("k", k)?;
        }
        if self.max_k < 2 {
            return Err(ConfigError::invalid("max_k must be at least 2"));
        }
        check_positive("max_iterations", self.max_iterations)?;
        check_positive("n_init", self.n_init)?;
        check_positive("min_points", self.min_points)?;
        if !(self.tolerance > 0.0) {
            return Err(ConfigError::invalid("tolerance must be positive"));
        }
        if let Some(h) = self.cut_height {
            if !(h > 0.0 && h.is_finite()) {
                return Err(ConfigError::invalid("cut_height must be positive"));
            }
        }
        if let Some(eps) = self.eps {
            if !(eps > 0.0 && eps.is_finite()) {
                return Err(ConfigError::invalid("eps must be positive"));
            }
        }
        if self.k.is_some() && self.cut_height.is_some() {
            return Err(ConfigError::invalid("k and cut_height are mutually exclusive"));
        }
        Ok(())
    }
}

// ---===[ Anomalies ]===---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyOptions {
    pub method: AnomalyMethod,
    /// Methods averaged by the ensemble.
    pub ensemble_methods: Vec<AnomalyMethod>,
    /// Expected share of anomalous observations.
    pub contamination: f64,
    /// Lower bound of the flagging threshold.
    pub min_score: f64,
    /// Robust z-score at which the statistical score reaches 0.5.
    pub z_threshold: f64,
    pub n_trees: usize,
    pub sample_size: usize,
    pub n_neighbors: usize,
    pub contextual: bool,
    pub context_window: usize,
    pub collective: bool,
    pub min_collective_length: usize,
    pub collective_threshold: f64,
    pub seed: Option<u64>,
}

impl Default for AnomalyOptions {
    fn default() -> Self {
        Self {
            method: AnomalyMethod::Ensemble,
            ensemble_methods: vec![
                AnomalyMethod::Statistical,
                AnomalyMethod::IsolationForest,
                AnomalyMethod::LocalOutlierFactor,
            ],
            contamination: 0.05,
            min_score: 0.5,
            z_threshold: 3.0,
            n_trees: 100,
            sample_size: 256,
            n_neighbors: 20,
            contextual: true,
            context_window: 5,
            collective: true,
            min_collective_length: 3,
            collective_threshold: 2.0,
            seed: None,
        }
    }
}

impl AnomalyOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ConfigError::invalid(format!(
                "contamination must lie in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if !(0.0..1.0).contains(&self.min_score) {
            return Err(ConfigError::invalid("min_score must lie in [0, 1)"));
        }
        if !(self.z_threshold > 0.0) {
            return Err(ConfigError::invalid("z_threshold must be positive"));
        }
        if !(self.collective_threshold > 0.0) {
            return Err(ConfigError::invalid("collective_threshold must be positive"));
        }
        check_positive("n_trees", self.n_trees)?;
        if self.sample_size < 2 {
            return Err(ConfigError::invalid("sample_size must be at least 2"));
        }
        check_positive("n_neighbors", self.n_neighbors)?;
        check_positive("context_window", self.context_window)?;
        if self.min_collective_length < 2 {
            return Err(ConfigError::invalid("min_collective_length must be at least 2"));
        }
        if self.method == AnomalyMethod::Ensemble {
            if self.ensemble_methods.is_empty() {
                return Err(ConfigError::invalid("ensemble_methods must not be empty"));
            }
            if self.ensemble_methods.contains(&AnomalyMethod::Ensemble) {
                return Err(ConfigError::invalid("ensemble_methods cannot contain 'ensemble'"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ForecastOptions::default().validate().is_ok());
        assert!(PatternOptions::default().validate().is_ok());
        assert!(VolatilityOptions::default().validate().is_ok());
        assert!(CorrelationOptions::default().validate().is_ok());
        assert!(ClusteringOptions::default().validate().is_ok());
        assert!(AnomalyOptions::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_horizon() {
        let options = ForecastOptions {
            horizon: 0,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let options = VolatilityOptions {
            confidence_level: 1.0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_rejects_nested_ensemble() {
        let options = AnomalyOptions {
            ensemble_methods: vec![AnomalyMethod::Ensemble],
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: ClusteringOptions =
            serde_json::from_str(r#"{"algorithm": "density", "seed": 7}"#).unwrap();
        assert_eq!(options.algorithm, ClusteringAlgorithm::Density);
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.max_k, 8);
        assert!(options.standardize);
    }

    #[test]
    fn test_pattern_type_filter() {
        let options = PatternOptions {
            pattern_types: vec![PatternType::Weekly],
            ..Default::default()
        };
        assert!(options.accepts(PatternType::Weekly));
        assert!(!options.accepts(PatternType::Yearly));
        assert!(PatternOptions::default().accepts(PatternType::Custom));
    }
}
