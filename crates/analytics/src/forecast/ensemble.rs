use core_types::{FitDiagnostics, ForecastModel, ForecastResult};
use std::collections::BTreeMap;

/// Errors closer than this are treated as equal.
const TIE_TOLERANCE: f64 = 1e-9;

/// Ensemble weights from holdout MAPE.
///
/// Scores are normalised inverse errors; models with zero error share the
/// whole score mass. Each weight is `floor + (1 - n*floor) * score`, which
/// keeps every model above the floor and sums to one. Degenerate cases (all
/// errors tied, or a floor that leaves no mass) give uniform weights.
pub(crate) fn inverse_error_weights(errors: &[(ForecastModel, f64)], floor: f64) -> BTreeMap<ForecastModel, f64> {
    let n = errors.len();
    if n == 0 {
        return BTreeMap::new();
    }
    let uniform = || errors.iter().map(|(m, _)| (*m, 1.0 / n as f64)).collect();

    let first = errors[0].1;
    let all_tied = errors.iter().all(|(_, e)| (e - first).abs() <= TIE_TOLERANCE);
    if all_tied || n as f64 * floor >= 1.0 {
        return uniform();
    }

    let zero_count = errors.iter().filter(|(_, e)| *e <= TIE_TOLERANCE).count();
    let scores: Vec<f64> = if zero_count > 0 {
        errors
            .iter()
            .map(|(_, e)| if *e <= TIE_TOLERANCE { 1.0 / zero_count as f64 } else { 0.0 })
            .collect()
    } else {
        let inverse: Vec<f64> = errors.iter().map(|(_, e)| 1.0 / e).collect();
        let total: f64 = inverse.iter().sum();
        inverse.iter().map(|v| v / total).collect()
    };

    let mass = 1.0 - n as f64 * floor;
    errors
        .iter()
        .zip(scores)
        .map(|((m, _), s)| (*m, floor + mass * s))
        .collect()
}

/// Interval half-width for each step: `z * sigma * (1 + growth)^(h-1)`.
pub(crate) fn half_widths(z: f64, sigma: f64, growth: f64, horizon: usize) -> Vec<f64> {
    (0..horizon)
        .map(|h| z * sigma * (1.0 + growth).powi(h as i32))
        .collect()
}

/// Weighted combination of member forecasts and their half-widths.
pub(crate) fn combine(
    members: &[(ForecastResult, Vec<f64>)],
    weights: &BTreeMap<ForecastModel, f64>,
    models: &[ForecastModel],
) -> ForecastResult {
    let horizon = members.first().map(|(m, _)| m.horizon()).unwrap_or(0);
    let mut point = vec![0.0; horizon];
    let mut half = vec![0.0; horizon];
    let mut diagnostics = FitDiagnostics {
        mape: 0.0,
        mae: 0.0,
        rmse: 0.0,
        residual_std: 0.0,
        holdout_len: members.first().map(|(m, _)| m.fit_diagnostics.holdout_len).unwrap_or(0),
        train_len: members.first().map(|(m, _)| m.fit_diagnostics.train_len).unwrap_or(0),
    };

    for ((member, widths), model) in members.iter().zip(models) {
        let w = weights.get(model).copied().unwrap_or(0.0);
        for h in 0..horizon {
            point[h] += w * member.point_forecast[h];
            half[h] += w * widths[h];
        }
        diagnostics.mape += w * member.fit_diagnostics.mape;
        diagnostics.mae += w * member.fit_diagnostics.mae;
        diagnostics.rmse += w * member.fit_diagnostics.rmse;
        diagnostics.residual_std += w * member.fit_diagnostics.residual_std;
    }

    ForecastResult {
        model_name: "ensemble".to_string(),
        lower_bound: point.iter().zip(&half).map(|(p, w)| p - w).collect(),
        upper_bound: point.iter().zip(&half).map(|(p, w)| p + w).collect(),
        point_forecast: point,
        fit_diagnostics: diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(weights: &BTreeMap<ForecastModel, f64>) -> f64 {
        weights.values().sum()
    }

    #[test]
    fn test_inverse_error_weights() {
        let errors = vec![
            (ForecastModel::Arima, 1.0),
            (ForecastModel::ExponentialSmoothing, 3.0),
        ];
        let weights = inverse_error_weights(&errors, 0.05);
        assert!((total(&weights) - 1.0).abs() < 1e-12);
        // Scores are 0.75 / 0.25, spread over the 0.9 left above the floors.
        assert!((weights[&ForecastModel::Arima] - (0.05 + 0.9 * 0.75)).abs() < 1e-12);
        assert!(weights[&ForecastModel::ExponentialSmoothing] >= 0.05);
    }

    #[test]
    fn test_zero_error_models_share_top_weight() {
        let errors = vec![
            (ForecastModel::Arima, 0.0),
            (ForecastModel::TrendExtrapolation, 0.0),
            (ForecastModel::ExponentialSmoothing, 4.2),
        ];
        let weights = inverse_error_weights(&errors, 0.05);
        assert!((weights[&ForecastModel::Arima] - 0.475).abs() < 1e-12);
        assert!((weights[&ForecastModel::TrendExtrapolation] - 0.475).abs() < 1e-12);
        assert!((weights[&ForecastModel::ExponentialSmoothing] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_ties_and_large_floor_are_uniform() {
        let errors = vec![(ForecastModel::Arima, 2.0), (ForecastModel::HoltWinters, 2.0)];
        let weights = inverse_error_weights(&errors, 0.05);
        assert_eq!(weights[&ForecastModel::Arima], 0.5);

        let errors = vec![(ForecastModel::Arima, 1.0), (ForecastModel::HoltWinters, 9.0)];
        let weights = inverse_error_weights(&errors, 0.5);
        assert_eq!(weights[&ForecastModel::HoltWinters], 0.5);
    }

    #[test]
    fn test_half_widths_grow() {
        let widths = half_widths(1.96, 2.0, 0.1, 4);
        assert!((widths[0] - 3.92).abs() < 1e-12);
        assert!(widths.windows(2).all(|w| w[1] >= w[0]));
    }
}
