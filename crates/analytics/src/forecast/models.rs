//! The individual forecasting models.
//!
//! Every model implements [`Forecaster`]: fit on a history, return the
//! in-sample one-step residuals and a point forecast of the requested length.

use crate::error::AnalyticsError;
use crate::stats;
use configuration::ForecastOptions;
use core_types::{ForecastModel, VARIANCE_EPSILON};
use tracing::trace;

#[derive(Debug, Clone)]
pub(crate) struct ModelFit {
    pub forecast: Vec<f64>,
    /// One-step-ahead in-sample errors, for the steps the model can predict.
    pub residuals: Vec<f64>,
}

pub(crate) trait Forecaster {
    /// The shortest history the model can be fitted on.
    fn min_history(&self) -> usize;

    fn fit(&self, history: &[f64], horizon: usize) -> Result<ModelFit, AnalyticsError>;
}

/// Builds the implementation of `model`. Seasonal models require `season`.
pub(crate) fn forecaster(
    model: ForecastModel,
    season: Option<usize>,
    options: &ForecastOptions,
) -> Option<Box<dyn Forecaster + Send + Sync>> {
    match model {
        ForecastModel::NaiveSeasonal => season.map(|m| Box::new(NaiveSeasonal { m }) as _),
        ForecastModel::ExponentialSmoothing => Some(Box::new(SimpleSmoothing)),
        ForecastModel::HoltWinters => season.map(|m| Box::new(HoltWinters { m }) as _),
        ForecastModel::Arima => Some(Box::new(Arima {
            p: options.arima_p,
            d: options.arima_d,
        })),
        ForecastModel::TrendExtrapolation => Some(Box::new(LinearTrend)),
    }
}

// ---===[ Naive seasonal ]===---

struct NaiveSeasonal {
    m: usize,
}

impl Forecaster for NaiveSeasonal {
    fn min_history(&self) -> usize {
        2 * self.m
    }

    fn fit(&self, history: &[f64], horizon: usize) -> Result<ModelFit, AnalyticsError> {
        let n = history.len();
        let m = self.m;
        let forecast = (0..horizon).map(|h| history[n - m + (h % m)]).collect();
        let residuals = (m..n).map(|t| history[t] - history[t - m]).collect();
        Ok(ModelFit { forecast, residuals })
    }
}

// ---===[ Simple exponential smoothing ]===---

struct SimpleSmoothing;

impl SimpleSmoothing {
    fn run(history: &[f64], alpha: f64) -> (f64, Vec<f64>) {
        let mut level = history[0];
        let mut residuals = Vec::with_capacity(history.len().saturating_sub(1));
        for &y in &history[1..] {
            residuals.push(y - level);
            level = alpha * y + (1.0 - alpha) * level;
        }
        (level, residuals)
    }
}

impl Forecaster for SimpleSmoothing {
    fn min_history(&self) -> usize {
        3
    }

    fn fit(&self, history: &[f64], horizon: usize) -> Result<ModelFit, AnalyticsError> {
        let mut best: Option<(f64, f64, Vec<f64>)> = None;
        for step in 1..=19 {
            let alpha = step as f64 * 0.05;
            let (level, residuals) = Self::run(history, alpha);
            let sse: f64 = residuals.iter().map(|r| r * r).sum();
            if best.as_ref().is_none_or(|(best_sse, _, _)| sse < *best_sse) {
                best = Some((sse, level, residuals));
            }
        }
        let (_, level, residuals) =
            best.ok_or_else(|| AnalyticsError::Calculation("smoothing grid is empty".to_string()))?;
        Ok(ModelFit {
            forecast: vec![level; horizon],
            residuals,
        })
    }
}

// ---===[ Holt-Winters (additive) ]===---

struct HoltWinters {
    m: usize,
}

struct HoltWintersState {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    residuals: Vec<f64>,
    sse: f64,
}

impl HoltWinters {
    const ALPHAS: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 0.9];
    const BETAS: [f64; 4] = [0.01, 0.05, 0.1, 0.2];
    const GAMMAS: [f64; 4] = [0.05, 0.1, 0.3, 0.5];

    fn run(&self, history: &[f64], alpha: f64, beta: f64, gamma: f64) -> HoltWintersState {
        let m = self.m;
        let first = stats::mean(&history[..m]);
        let second = stats::mean(&history[m..2 * m]);
        let mut level = first;
        let mut trend = (second - first) / m as f64;
        let mut seasonal: Vec<f64> = history[..m].iter().map(|v| v - first).collect();

        let mut residuals = Vec::with_capacity(history.len() - m);
        let mut sse = 0.0;
        for (t, &y) in history.iter().enumerate().skip(m) {
            let s = seasonal[t % m];
            let fitted = level + trend + s;
            let error = y - fitted;
            residuals.push(error);
            sse += error * error;

            let previous = level;
            level = alpha * (y - s) + (1.0 - alpha) * (level + trend);
            trend = beta * (level - previous) + (1.0 - beta) * trend;
            seasonal[t % m] = gamma * (y - level) + (1.0 - gamma) * s;
        }
        HoltWintersState {
            level,
            trend,
            seasonal,
            residuals,
            sse,
        }
    }
}

impl Forecaster for HoltWinters {
    fn min_history(&self) -> usize {
        2 * self.m
    }

    fn fit(&self, history: &[f64], horizon: usize) -> Result<ModelFit, AnalyticsError> {
        let mut best: Option<HoltWintersState> = None;
        for &alpha in &Self::ALPHAS {
            for &beta in &Self::BETAS {
                for &gamma in &Self::GAMMAS {
                    let state = self.run(history, alpha, beta, gamma);
                    if state.sse.is_finite()
                        && best.as_ref().is_none_or(|b| state.sse < b.sse)
                    {
                        best = Some(state);
                    }
                }
            }
        }
        let state = best.ok_or_else(|| {
            AnalyticsError::Calculation("holt-winters produced no finite fit".to_string())
        })?;

        let n = history.len();
        let forecast = (1..=horizon)
            .map(|h| state.level + h as f64 * state.trend + state.seasonal[(n + h - 1) % self.m])
            .collect();
        Ok(ModelFit {
            forecast,
            residuals: state.residuals,
        })
    }
}

// ---===[ ARIMA(p, d, 0) with drift ]===---

struct Arima {
    p: usize,
    d: usize,
}

impl Arima {
    fn difference(series: &[f64]) -> Vec<f64> {
        series.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Solves the Yule-Walker equations by the Levinson-Durbin recursion.
    fn levinson_durbin(acf: &[f64], p: usize) -> Vec<f64> {
        let mut phi = vec![vec![0.0; p + 1]; p + 1];
        let mut sigma = vec![0.0; p + 1];
        sigma[0] = acf[0];

        for k in 1..=p {
            if sigma[k - 1].abs() < VARIANCE_EPSILON {
                // Perfectly predictable at order k-1; higher lags add nothing.
                return (1..=p).map(|j| phi[k - 1][j]).collect();
            }
            let mut num = acf[k];
            for j in 1..k {
                num -= phi[k - 1][j] * acf[k - j];
            }
            phi[k][k] = num / sigma[k - 1];
            for j in 1..k {
                phi[k][j] = phi[k - 1][j] - phi[k][k] * phi[k - 1][k - j];
            }
            sigma[k] = sigma[k - 1] * (1.0 - phi[k][k].powi(2));
        }
        (1..=p).map(|j| phi[p][j]).collect()
    }
}

impl Forecaster for Arima {
    fn min_history(&self) -> usize {
        self.d + self.p + 3
    }

    fn fit(&self, history: &[f64], horizon: usize) -> Result<ModelFit, AnalyticsError> {
        // Keep the last value at each differencing level to integrate back.
        let mut anchors = Vec::with_capacity(self.d);
        let mut working = history.to_vec();
        for _ in 0..self.d {
            anchors.push(*working.last().ok_or_else(|| {
                AnalyticsError::InsufficientData("arima differencing emptied the series".to_string())
            })?);
            working = Self::difference(&working);
        }
        if working.len() <= self.p + 1 {
            return Err(AnalyticsError::InsufficientData(format!(
                "arima({},{},0) needs more than {} observations after differencing",
                self.p,
                self.d,
                self.p + 1
            )));
        }

        let drift = stats::mean(&working);
        let centered: Vec<f64> = working.iter().map(|v| v - drift).collect();
        let acf = stats::autocorrelation(&centered, self.p);
        let coefficients = if acf.len() == self.p + 1 && stats::variance(&centered) > VARIANCE_EPSILON {
            Self::levinson_durbin(&acf, self.p)
        } else {
            vec![0.0; self.p]
        };
        trace!(?coefficients, drift, "arima coefficients");

        let predict = |values: &[f64], t: usize| -> f64 {
            drift
                + coefficients
                    .iter()
                    .enumerate()
                    .map(|(j, phi)| phi * (values[t - j - 1] - drift))
                    .sum::<f64>()
        };

        let residuals: Vec<f64> = (self.p..working.len())
            .map(|t| working[t] - predict(&working, t))
            .collect();

        let mut extended = working.clone();
        for _ in 0..horizon {
            let t = extended.len();
            let next = predict(&extended, t);
            extended.push(next);
        }
        let mut forecast = extended[working.len()..].to_vec();

        for anchor in anchors.iter().rev() {
            let mut level = *anchor;
            for value in forecast.iter_mut() {
                level += *value;
                *value = level;
            }
        }

        Ok(ModelFit { forecast, residuals })
    }
}

// ---===[ Linear trend ]===---

struct LinearTrend;

impl Forecaster for LinearTrend {
    fn min_history(&self) -> usize {
        3
    }

    fn fit(&self, history: &[f64], horizon: usize) -> Result<ModelFit, AnalyticsError> {
        let (intercept, slope) = stats::linear_fit(history);
        let n = history.len();
        let residuals = history
            .iter()
            .enumerate()
            .map(|(t, y)| y - (intercept + slope * t as f64))
            .collect();
        let forecast = (0..horizon)
            .map(|h| intercept + slope * (n + h) as f64)
            .collect();
        Ok(ModelFit { forecast, residuals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_trend_series() -> Vec<f64> {
        (0..30).map(|i| 1500.0 + 2.0 * i as f64).collect()
    }

    fn create_seasonal_series() -> Vec<f64> {
        (0..48)
            .map(|i| 1500.0 + [10.0, -5.0, -15.0, 10.0][i % 4] + 0.5 * i as f64)
            .collect()
    }

    fn fit(model: ForecastModel, season: Option<usize>, history: &[f64], horizon: usize) -> ModelFit {
        forecaster(model, season, &ForecastOptions::default())
            .unwrap()
            .fit(history, horizon)
            .unwrap()
    }

    #[test]
    fn test_trend_extrapolation_is_exact_on_a_line() {
        let result = fit(ForecastModel::TrendExtrapolation, None, &create_trend_series(), 3);
        assert!((result.forecast[0] - 1560.0).abs() < 1e-9);
        assert!((result.forecast[2] - 1564.0).abs() < 1e-9);
    }

    #[test]
    fn test_arima_follows_drift() {
        let result = fit(ForecastModel::Arima, None, &create_trend_series(), 4);
        for (h, value) in result.forecast.iter().enumerate() {
            let expected = 1558.0 + 2.0 * (h + 1) as f64;
            assert!((value - expected).abs() < 1e-9, "h={} got {}", h, value);
        }
        assert!(result.residuals.iter().all(|r| r.abs() < 1e-9));
    }

    #[test]
    fn test_levinson_durbin_ar1() {
        // For an AR(1) with phi = 0.6 the autocorrelations are 0.6^k.
        let coefficients = Arima::levinson_durbin(&[1.0, 0.6, 0.36], 2);
        assert!((coefficients[0] - 0.6).abs() < 1e-12);
        assert!(coefficients[1].abs() < 1e-12);
    }

    #[test]
    fn test_naive_seasonal_repeats_last_cycle() {
        let history = create_seasonal_series();
        let result = fit(ForecastModel::NaiveSeasonal, Some(4), &history, 6);
        assert_eq!(result.forecast[0], history[44]);
        assert_eq!(result.forecast[4], history[44]);
        assert_eq!(result.forecast[5], history[45]);
    }

    #[test]
    fn test_holt_winters_tracks_seasonality() {
        let history = create_seasonal_series();
        let result = fit(ForecastModel::HoltWinters, Some(4), &history, 4);
        for (h, value) in result.forecast.iter().enumerate() {
            let t = 48 + h;
            let expected = 1500.0 + [10.0, -5.0, -15.0, 10.0][t % 4] + 0.5 * t as f64;
            assert!((value - expected).abs() < 2.0, "h={} got {} want {}", h, value, expected);
        }
    }

    #[test]
    fn test_seasonal_models_need_a_season() {
        let options = ForecastOptions::default();
        assert!(forecaster(ForecastModel::HoltWinters, None, &options).is_none());
        assert!(forecaster(ForecastModel::NaiveSeasonal, None, &options).is_none());
        assert!(forecaster(ForecastModel::Arima, None, &options).is_some());
    }

    #[test]
    fn test_smoothing_is_flat() {
        let result = fit(ForecastModel::ExponentialSmoothing, None, &[5.0, 5.0, 5.0, 5.0], 3);
        assert_eq!(result.forecast, vec![5.0; 3]);
    }
}
