use crate::anomaly::AnomalyInput;
use configuration::{
    AnomalyOptions, ClusteringOptions, CorrelationOptions, ForecastOptions, PatternOptions,
    VolatilityOptions,
};
use core_types::{
    AnomalyRecord, ClusterAssignment, CorrelationMatrix, Diagnostic, EnsembleForecast, Pattern,
    TimeSeries, VolatilityEstimate,
};
use serde::{Deserialize, Serialize};

/// One analysis to run. Options left out fall back to the engine's configured defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis", rename_all = "snake_case")]
pub enum AnalysisRequest {
    Forecast {
        series: TimeSeries,
        #[serde(default)]
        options: Option<ForecastOptions>,
    },
    Patterns {
        series: TimeSeries,
        #[serde(default)]
        options: Option<PatternOptions>,
    },
    Volatility {
        series: TimeSeries,
        #[serde(default)]
        options: Option<VolatilityOptions>,
    },
    Correlation {
        series: Vec<TimeSeries>,
        #[serde(default)]
        options: Option<CorrelationOptions>,
    },
    Clustering {
        features: Vec<Vec<f64>>,
        #[serde(default)]
        options: Option<ClusteringOptions>,
    },
    Anomaly {
        input: AnomalyInput,
        #[serde(default)]
        options: Option<AnomalyOptions>,
    },
}

impl AnalysisRequest {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisRequest::Forecast { .. } => AnalysisKind::Forecast,
            AnalysisRequest::Patterns { .. } => AnalysisKind::Patterns,
            AnalysisRequest::Volatility { .. } => AnalysisKind::Volatility,
            AnalysisRequest::Correlation { .. } => AnalysisKind::Correlation,
            AnalysisRequest::Clustering { .. } => AnalysisKind::Clustering,
            AnalysisRequest::Anomaly { .. } => AnalysisKind::Anomaly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Forecast,
    Patterns,
    Volatility,
    Correlation,
    Clustering,
    Anomaly,
}

/// The entity an analysis produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisDetail {
    Forecast(EnsembleForecast),
    Patterns(Vec<Pattern>),
    Volatility(VolatilityEstimate),
    Correlation(CorrelationMatrix),
    Clustering(ClusterAssignment),
    Anomaly(Vec<AnomalyRecord>),
}

/// How much to trust a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<f64>,
    /// Holdout MAPE for forecasts, silhouette for clusterings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_score: Option<f64>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The self-contained envelope returned for every analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub analysis: AnalysisKind,
    pub summary: String,
    pub detail: AnalysisDetail,
    pub confidence: Confidence,
}

impl AnalysisReport {
    pub fn from_forecast(forecast: EnsembleForecast) -> Self {
        let combined = &forecast.combined;
        let summary = match (
            combined.point_forecast.first(),
            combined.lower_bound.first(),
            combined.upper_bound.first(),
        ) {
            (Some(p), Some(lo), Some(hi)) => format!(
                "ensemble of {} models, next value {:.2} ({:.2} to {:.2})",
                forecast.members.len(),
                p,
                lo,
                hi
            ),
            _ => format!("ensemble of {} models", forecast.members.len()),
        };
        let confidence = Confidence {
            confidence_level: Some(forecast.confidence_level),
            validation_score: Some(combined.fit_diagnostics.mape),
            diagnostics: forecast.diagnostics.clone(),
        };
        Self {
            analysis: AnalysisKind::Forecast,
            summary,
            detail: AnalysisDetail::Forecast(forecast),
            confidence,
        }
    }

    pub fn from_patterns(patterns: Vec<Pattern>) -> Self {
        let summary = match patterns.first() {
            Some(p) => format!(
                "{} patterns, strongest {:?} with period {:.1} (strength {:.2})",
                patterns.len(),
                p.pattern_type,
                p.period,
                p.strength
            ),
            None => "no periodic patterns".to_string(),
        };
        Self {
            analysis: AnalysisKind::Patterns,
            summary,
            detail: AnalysisDetail::Patterns(patterns),
            confidence: Confidence {
                confidence_level: None,
                validation_score: None,
                diagnostics: Vec::new(),
            },
        }
    }

    pub fn from_volatility(estimate: VolatilityEstimate) -> Self {
        let latest = estimate.series.last().copied().unwrap_or(0.0);
        let summary = format!(
            "{:?} volatility, latest {:.4}, persistence {:.3}",
            estimate.model, latest, estimate.persistence
        );
        let confidence = Confidence {
            confidence_level: estimate.risk_metrics.as_ref().map(|r| r.confidence_level),
            validation_score: None,
            diagnostics: estimate.diagnostics.clone(),
        };
        Self {
            analysis: AnalysisKind::Volatility,
            summary,
            detail: AnalysisDetail::Volatility(estimate),
            confidence,
        }
    }

    pub fn from_correlation(matrix: CorrelationMatrix, significance: f64) -> Self {
        let n = matrix.matrix.len();
        let summary = format!(
            "{}x{} {:?} {:?} correlation over {} observations",
            n, n, matrix.method, matrix.kind, matrix.observations
        );
        let confidence = Confidence {
            confidence_level: Some(1.0 - significance),
            validation_score: matrix.factor_groups.as_ref().map(|g| g.validation_score),
            diagnostics: matrix.diagnostics.clone(),
        };
        Self {
            analysis: AnalysisKind::Correlation,
            summary,
            detail: AnalysisDetail::Correlation(matrix),
            confidence,
        }
    }

    pub fn from_clustering(assignment: ClusterAssignment) -> Self {
        let summary = format!(
            "{} clusters by {:?}, silhouette {:.3}",
            assignment.k, assignment.algorithm, assignment.validation_score
        );
        let confidence = Confidence {
            confidence_level: None,
            validation_score: Some(assignment.validation_score),
            diagnostics: assignment.diagnostics.clone(),
        };
        Self {
            analysis: AnalysisKind::Clustering,
            summary,
            detail: AnalysisDetail::Clustering(assignment),
            confidence,
        }
    }

    pub fn from_anomalies(records: Vec<AnomalyRecord>, observations: usize) -> Self {
        let summary = format!("{} of {} observations flagged", records.len(), observations);
        Self {
            analysis: AnalysisKind::Anomaly,
            summary,
            detail: AnalysisDetail::Anomaly(records),
            confidence: Confidence {
                confidence_level: None,
                validation_score: None,
                diagnostics: Vec::new(),
            },
        }
    }
}

/// A batch element: a caller-chosen id and the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub request: AnalysisRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Ok { report: AnalysisReport },
    Error { kind: String, message: String },
}

/// One slot of a batch result; slots keep the order of the requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub id: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchEntry {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Ok { .. })
    }
}
