use serde::{Deserialize, Serialize};
use std::fmt;

/// The forecasting models the ensemble can draw on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ForecastModel {
    NaiveSeasonal,
    ExponentialSmoothing,
    HoltWinters,
    Arima,
    TrendExtrapolation,
}

impl ForecastModel {
    pub const ALL: [ForecastModel; 5] = [
        ForecastModel::NaiveSeasonal,
        ForecastModel::ExponentialSmoothing,
        ForecastModel::HoltWinters,
        ForecastModel::Arima,
        ForecastModel::TrendExtrapolation,
    ];

    /// Whether the model needs a season length (and two full cycles of history).
    pub fn is_seasonal(&self) -> bool {
        matches!(self, ForecastModel::NaiveSeasonal | ForecastModel::HoltWinters)
    }
}

impl fmt::Display for ForecastModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForecastModel::NaiveSeasonal => "naive_seasonal",
            ForecastModel::ExponentialSmoothing => "exponential_smoothing",
            ForecastModel::HoltWinters => "holt_winters",
            ForecastModel::Arima => "arima",
            ForecastModel::TrendExtrapolation => "trend_extrapolation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PatternMethod {
    Autocorrelation,
    Spectral,
    Decomposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PatternType {
    Weekly,
    Monthly,
    Yearly,
    Custom,
}

impl PatternType {
    /// Classifies a period expressed in days.
    pub fn from_period_days(days: f64) -> Self {
        if (6.5..=7.5).contains(&days) {
            PatternType::Weekly
        } else if (28.0..=31.5).contains(&days) {
            PatternType::Monthly
        } else if (355.0..=375.0).contains(&days) {
            PatternType::Yearly
        } else {
            PatternType::Custom
        }
    }

    /// The canonical period of the type in days, if it has one.
    pub fn nominal_days(&self) -> Option<f64> {
        match self {
            PatternType::Weekly => Some(7.0),
            PatternType::Monthly => Some(30.0),
            PatternType::Yearly => Some(365.0),
            PatternType::Custom => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum VolatilityModel {
    Ewma,
    Garch,
    Historical,
}

/// How a level series (e.g. a rating history) is turned into changes before
/// volatility is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ReturnsTransform {
    Difference,
    Percent,
    Log,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
    Kendall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum CorrelationAnalysisType {
    Pairwise,
    Partial,
    Network,
    HierarchicalFactor,
}

/// Which kind of coefficient a `CorrelationMatrix` actually holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationKind {
    Pairwise,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ClusteringAlgorithm {
    KMeans,
    Hierarchical,
    Density,
    Distribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Linkage {
    Single,
    Complete,
    Average,
    Ward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum AnomalyMethod {
    Statistical,
    IsolationForest,
    LocalOutlierFactor,
    Ensemble,
}

/// Ordinal severity of a flagged observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Maps a normalized anomaly score in `[0, 1)` onto the ordinal scale.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Severity::Critical
        } else if score >= 0.7 {
            Severity::High
        } else if score >= 0.6 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeLevel {
    Low,
    Medium,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_classification() {
        assert_eq!(PatternType::from_period_days(7.0), PatternType::Weekly);
        assert_eq!(PatternType::from_period_days(30.4), PatternType::Monthly);
        assert_eq!(PatternType::from_period_days(365.25), PatternType::Yearly);
        assert_eq!(PatternType::from_period_days(12.0), PatternType::Custom);
    }

    #[test]
    fn test_severity_is_ordinal() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert_eq!(Severity::from_score(0.75), Severity::High);
        assert_eq!(Severity::from_score(0.1), Severity::Low);
    }

    #[test]
    fn test_identifiers_serialize_snake_case() {
        let json = serde_json::to_string(&ForecastModel::HoltWinters).unwrap();
        assert_eq!(json, "\"holt_winters\"");
        let parsed: AnomalyMethod = serde_json::from_str("\"isolation_forest\"").unwrap();
        assert_eq!(parsed, AnomalyMethod::IsolationForest);
    }
}
