//! Multi-model forecasting with an inverse-error ensemble.

mod ensemble;
mod models;

use crate::error::AnalyticsError;
use crate::patterns::{self, PatternDetector};
use crate::stats;
use configuration::{ForecastOptions, PatternOptions};
use core_types::{
    validate, Diagnostic, EnsembleForecast, ExcludedModel, FitDiagnostics, ForecastModel,
    ForecastResult, PatternMethod, TimeSeries,
};
use models::Forecaster;
use tracing::{debug, warn};

/// Shortest series the engine accepts.
pub const MIN_LENGTH: usize = 10;

/// Fits the requested models, scores them on a holdout and combines them.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    options: ForecastOptions,
}

struct Scored {
    model: ForecastModel,
    result: ForecastResult,
    half_widths: Vec<f64>,
}

impl ForecastEngine {
    pub fn new(options: ForecastOptions) -> Result<Self, AnalyticsError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &ForecastOptions {
        &self.options
    }

    pub fn forecast(&self, series: &TimeSeries) -> Result<EnsembleForecast, AnalyticsError> {
        validate(series, MIN_LENGTH)?;
        let values = &series.values;
        let n = values.len();
        let horizon = self.options.horizon;

        let holdout_len = ((n as f64 * self.options.holdout_ratio).round() as usize).clamp(1, n / 2);
        let train_len = n - holdout_len;
        let z = stats::normal_critical(self.options.confidence_level)?;

        let mut diagnostics = Vec::new();
        let season = self.season_length(series, &mut diagnostics);

        let mut excluded = Vec::new();
        let mut scored = Vec::new();
        for model in ForecastModel::ALL
            .into_iter()
            .filter(|m| self.options.models.contains(m))
        {
            let Some(forecaster) = models::forecaster(model, season, &self.options) else {
                excluded.push(ExcludedModel {
                    model_name: model,
                    reason: "no seasonal period detected".to_string(),
                });
                continue;
            };
            if train_len < forecaster.min_history() {
                excluded.push(ExcludedModel {
                    model_name: model,
                    reason: format!(
                        "needs {} training observations, {} available",
                        forecaster.min_history(),
                        train_len
                    ),
                });
                continue;
            }
            match self.score(model, forecaster.as_ref(), values, train_len, z) {
                Ok(s) => scored.push(s),
                Err(e) => {
                    warn!(%model, error = %e, "model fit failed; excluding from ensemble");
                    excluded.push(ExcludedModel {
                        model_name: model,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for e in &excluded {
            diagnostics.push(Diagnostic::excluded(e.model_name.to_string(), e.reason.clone()));
        }
        if scored.is_empty() {
            return Err(AnalyticsError::InsufficientData(format!(
                "no requested forecast model can be fitted to {} observations",
                n
            )));
        }

        let errors: Vec<(ForecastModel, f64)> = scored
            .iter()
            .map(|s| (s.model, s.result.fit_diagnostics.mape))
            .collect();
        let weights = ensemble::inverse_error_weights(&errors, self.options.weight_floor);

        let pairs: Vec<(ForecastResult, Vec<f64>)> = scored
            .iter()
            .map(|s| (s.result.clone(), s.half_widths.clone()))
            .collect();
        let order: Vec<ForecastModel> = scored.iter().map(|s| s.model).collect();
        let combined = ensemble::combine(&pairs, &weights, &order);

        if !combined.is_well_formed() || combined.horizon() != horizon {
            return Err(AnalyticsError::Calculation(
                "ensemble combination produced a malformed forecast".to_string(),
            ));
        }

        debug!(
            models = scored.len(),
            excluded = excluded.len(),
            ?season,
            "ensemble forecast built"
        );
        Ok(EnsembleForecast {
            members: scored.into_iter().map(|s| s.result).collect(),
            weights,
            combined,
            confidence_level: self.options.confidence_level,
            season_length: season,
            excluded,
            diagnostics,
        })
    }

    /// The configured season length, or the strongest autocorrelation period.
    fn season_length(&self, series: &TimeSeries, diagnostics: &mut Vec<Diagnostic>) -> Option<usize> {
        if let Some(m) = self.options.season_length {
            return Some(m);
        }
        if series.len() < patterns::MIN_LENGTH {
            return None;
        }
        let detector = PatternDetector::new(PatternOptions {
            method: PatternMethod::Autocorrelation,
            ..Default::default()
        })
        .ok()?;
        match detector.detect(series) {
            Ok(found) => found.first().map(|p| p.period.round() as usize).filter(|m| *m >= 2),
            Err(e) => {
                diagnostics.push(Diagnostic::fallback(
                    "season_detection",
                    "non_seasonal",
                    e.to_string(),
                ));
                None
            }
        }
    }

    /// Holdout scoring, then a full refit for the final forecast and interval.
    fn score(
        &self,
        model: ForecastModel,
        forecaster: &(dyn Forecaster + Send + Sync),
        values: &[f64],
        train_len: usize,
        z: f64,
    ) -> Result<Scored, AnalyticsError> {
        let holdout = &values[train_len..];
        let trial = forecaster.fit(&values[..train_len], holdout.len())?;
        let (mape, mae, rmse) = holdout_errors(holdout, &trial.forecast);

        let full = forecaster.fit(values, self.options.horizon)?;
        let residual_std = stats::sample_std(&full.residuals);
        if !residual_std.is_finite() || full.forecast.iter().any(|v| !v.is_finite()) {
            return Err(AnalyticsError::Calculation(format!("{} produced non-finite values", model)));
        }

        let widths = ensemble::half_widths(
            z,
            residual_std,
            self.options.interval_growth,
            self.options.horizon,
        );
        let result = ForecastResult {
            model_name: model.to_string(),
            lower_bound: full.forecast.iter().zip(&widths).map(|(p, w)| p - w).collect(),
            upper_bound: full.forecast.iter().zip(&widths).map(|(p, w)| p + w).collect(),
            point_forecast: full.forecast,
            fit_diagnostics: FitDiagnostics {
                mape,
                mae,
                rmse,
                residual_std,
                holdout_len: holdout.len(),
                train_len,
            },
        };
        Ok(Scored {
            model,
            result,
            half_widths: widths,
        })
    }
}

/// MAPE (percent), MAE and RMSE. Zero actuals are left out of the MAPE; an
/// all-zero holdout scores 0 when matched exactly and 100 otherwise.
fn holdout_errors(actual: &[f64], predicted: &[f64]) -> (f64, f64, f64) {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return (0.0, 0.0, 0.0);
    }
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    let mut pct_count = 0usize;
    for (a, p) in actual.iter().zip(predicted) {
        let e = a - p;
        abs_sum += e.abs();
        sq_sum += e * e;
        if a.abs() > f64::EPSILON {
            pct_sum += (e / a).abs();
            pct_count += 1;
        }
    }
    let mae = abs_sum / n as f64;
    let mape = if pct_count > 0 {
        100.0 * pct_sum / pct_count as f64
    } else if mae <= f64::EPSILON {
        0.0
    } else {
        100.0
    };
    (mape, mae, (sq_sum / n as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn engine(options: ForecastOptions) -> ForecastEngine {
        ForecastEngine::new(options).unwrap()
    }

    #[test]
    fn test_rejects_short_series() {
        let series = TimeSeries::new(vec![1500.0; 9]);
        assert!(matches!(
            engine(ForecastOptions::default()).forecast(&series),
            Err(AnalyticsError::Validation(_))
        ));
    }

    #[test]
    fn test_linear_trend_excludes_seasonal_models() {
        let series = TimeSeries::new((0..24).map(|i| 1500.0 + i as f64).collect());
        let result = engine(ForecastOptions {
            horizon: 6,
            ..Default::default()
        })
        .forecast(&series)
        .unwrap();

        assert_eq!(result.season_length, None);
        let excluded: Vec<_> = result.excluded.iter().map(|e| e.model_name).collect();
        assert!(excluded.contains(&ForecastModel::HoltWinters));
        assert!(excluded.contains(&ForecastModel::NaiveSeasonal));
        for (h, value) in result.combined.point_forecast.iter().enumerate() {
            let truth = 1524.0 + h as f64;
            assert!((value - truth).abs() / truth < 0.01);
        }
    }

    #[test]
    fn test_seasonal_series_uses_detected_season() {
        let series = TimeSeries::new(
            (0..70)
                .map(|i| 1500.0 + 25.0 * (TAU * i as f64 / 7.0).sin())
                .collect(),
        );
        let result = engine(ForecastOptions::default()).forecast(&series).unwrap();
        assert_eq!(result.season_length, Some(7));
        assert!(result.weights.contains_key(&ForecastModel::HoltWinters));
        assert!(result.combined.is_well_formed());
        let total: f64 = result.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_intervals_widen_with_horizon() {
        let series = TimeSeries::new(
            (0..40)
                .map(|i| 1500.0 + 3.0 * ((i * 7919) % 13) as f64 + i as f64)
                .collect(),
        );
        let result = engine(ForecastOptions {
            models: vec![ForecastModel::Arima, ForecastModel::ExponentialSmoothing],
            horizon: 8,
            ..Default::default()
        })
        .forecast(&series)
        .unwrap();
        for forecast in result.members.iter().chain(std::iter::once(&result.combined)) {
            assert!(forecast.is_well_formed());
            let widths: Vec<f64> = forecast
                .upper_bound
                .iter()
                .zip(&forecast.lower_bound)
                .map(|(u, l)| u - l)
                .collect();
            assert!(widths.windows(2).all(|w| w[1] + 1e-9 >= w[0]));
        }
    }

    #[test]
    fn test_only_seasonal_models_without_season_is_insufficient() {
        let series = TimeSeries::new((0..12).map(|i| i as f64).collect());
        let result = engine(ForecastOptions {
            models: vec![ForecastModel::HoltWinters],
            ..Default::default()
        })
        .forecast(&series);
        assert!(matches!(result, Err(AnalyticsError::InsufficientData(_))));
    }

    #[test]
    fn test_holdout_errors() {
        let (mape, mae, rmse) = holdout_errors(&[100.0, 200.0], &[110.0, 180.0]);
        assert!((mape - 10.0).abs() < 1e-12);
        assert!((mae - 15.0).abs() < 1e-12);
        assert!((rmse - (250.0f64).sqrt()).abs() < 1e-12);
    }
}
