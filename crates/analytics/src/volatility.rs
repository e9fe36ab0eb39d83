use crate::error::AnalyticsError;
use crate::optimize::{self, Bounds};
use crate::stats;
use configuration::VolatilityOptions;
use core_types::{
    validate, Diagnostic, Regime, RegimeLevel, ReturnsTransform, TimeSeries, VolatilityEstimate,
    VolatilityModel, VARIANCE_EPSILON,
};
use tracing::{debug, warn};

/// Shortest series the analyzer accepts.
pub const MIN_LENGTH: usize = 30;

/// `alpha + beta` at or above this is treated as non-stationary.
const STATIONARITY_LIMIT: f64 = 0.999;

/// Estimates time-varying dispersion of a series' changes.
#[derive(Debug, Clone)]
pub struct VolatilityAnalyzer {
    options: VolatilityOptions,
}

/// A conditional variance path plus what is needed to project it forward.
struct VarianceFit {
    variance: Vec<f64>,
    persistence: f64,
    forecast: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct GarchParams {
    omega: f64,
    alpha: f64,
    beta: f64,
}

impl GarchParams {
    fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    fn long_run_variance(&self) -> f64 {
        self.omega / (1.0 - self.persistence())
    }

    /// Conditional variance for every step, seeded with `initial`.
    fn variance_path(&self, returns: &[f64], initial: f64) -> Vec<f64> {
        let mut variance = Vec::with_capacity(returns.len());
        let mut previous = initial;
        for t in 0..returns.len() {
            let v = if t == 0 {
                initial
            } else {
                self.omega + self.alpha * returns[t - 1].powi(2) + self.beta * previous
            };
            let v = v.max(VARIANCE_EPSILON);
            variance.push(v);
            previous = v;
        }
        variance
    }
}

impl VolatilityAnalyzer {
    pub fn new(options: VolatilityOptions) -> Result<Self, AnalyticsError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &VolatilityOptions {
        &self.options
    }

    pub fn analyze(&self, series: &TimeSeries) -> Result<VolatilityEstimate, AnalyticsError> {
        validate(series, MIN_LENGTH)?;
        let opts = &self.options;

        let returns = transform_returns(&series.values, opts.returns)?;
        let center = stats::mean(&returns);
        let demeaned: Vec<f64> = returns.iter().map(|r| r - center).collect();

        let mut diagnostics = Vec::new();
        let (model, fit) = match opts.model {
            VolatilityModel::Ewma => (VolatilityModel::Ewma, self.ewma(&demeaned)),
            VolatilityModel::Historical => (VolatilityModel::Historical, self.historical(&demeaned)),
            VolatilityModel::Garch => match self.garch(&demeaned, &mut diagnostics) {
                Some(fit) => (VolatilityModel::Garch, fit),
                None => (VolatilityModel::Ewma, self.ewma(&demeaned)),
            },
        };

        let mut volatility: Vec<f64> = fit
            .variance
            .iter()
            .map(|v| v.max(VARIANCE_EPSILON).sqrt())
            .collect();
        // Differencing drops one observation; repeat the first estimate to realign.
        while volatility.len() < series.len() {
            let first = volatility.first().copied().unwrap_or(VARIANCE_EPSILON.sqrt());
            volatility.insert(0, first);
        }
        let forecast: Vec<f64> = fit
            .forecast
            .iter()
            .map(|v| v.max(VARIANCE_EPSILON).sqrt())
            .collect();

        let risk_metrics = if opts.risk_metrics {
            let next_sigma = forecast.first().copied().unwrap_or(VARIANCE_EPSILON.sqrt());
            Some(risk::risk_metrics(&returns, next_sigma, opts.confidence_level)?)
        } else {
            None
        };

        let regimes = opts
            .regimes
            .then(|| detect_regimes(&volatility, opts.min_regime_length, opts.clip_threshold));

        debug!(
            requested = ?opts.model,
            used = ?model,
            persistence = fit.persistence,
            "volatility estimated"
        );
        Ok(VolatilityEstimate {
            series: volatility,
            model,
            requested_model: opts.model,
            persistence: fit.persistence,
            forecast,
            risk_metrics,
            regimes,
            diagnostics,
        })
    }

    fn ewma(&self, returns: &[f64]) -> VarianceFit {
        let lambda = self.options.lambda;
        let initial = stats::sample_std(returns).powi(2).max(VARIANCE_EPSILON);
        let mut variance = Vec::with_capacity(returns.len());
        let mut previous = initial;
        for t in 0..returns.len() {
            let v = if t == 0 {
                initial
            } else {
                lambda * previous + (1.0 - lambda) * returns[t - 1].powi(2)
            };
            let v = v.max(VARIANCE_EPSILON);
            variance.push(v);
            previous = v;
        }
        let next = returns
            .last()
            .map(|r| lambda * previous + (1.0 - lambda) * r.powi(2))
            .unwrap_or(previous)
            .max(VARIANCE_EPSILON);
        VarianceFit {
            variance,
            persistence: lambda,
            forecast: vec![next; self.options.horizon],
        }
    }

    fn historical(&self, returns: &[f64]) -> VarianceFit {
        let window = self.options.window;
        let variance: Vec<f64> = (0..returns.len())
            .map(|t| {
                let start = (t + 1).saturating_sub(window);
                stats::variance(&returns[start..=t]).max(VARIANCE_EPSILON)
            })
            .collect();
        let vol: Vec<f64> = variance.iter().map(|v| v.sqrt()).collect();
        let acf = stats::autocorrelation(&vol, 1);
        let persistence = acf.get(1).copied().unwrap_or(0.0);
        let persistence = if persistence.is_finite() { persistence.clamp(0.0, 1.0) } else { 0.0 };
        let last = variance.last().copied().unwrap_or(VARIANCE_EPSILON);
        VarianceFit {
            variance,
            persistence,
            forecast: vec![last; self.options.horizon],
        }
    }

    /// Gaussian maximum-likelihood GARCH(1,1). `None` means the caller should
    /// fall back to EWMA; the reason has already been recorded in `diagnostics`.
    fn garch(&self, returns: &[f64], diagnostics: &mut Vec<Diagnostic>) -> Option<VarianceFit> {
        let fall_back = |reason: String, diagnostics: &mut Vec<Diagnostic>| {
            warn!(%reason, "GARCH fit rejected; using EWMA");
            diagnostics.push(Diagnostic::fallback("garch", "ewma", reason));
        };

        let sample_var = stats::sample_std(returns).powi(2);
        if sample_var <= VARIANCE_EPSILON {
            fall_back("returns carry no variance".to_string(), diagnostics);
            return None;
        }
        // Fit on unit-variance returns so the simplex works on comparable scales.
        let scale = sample_var.sqrt();
        let unit: Vec<f64> = returns.iter().map(|r| r / scale).collect();

        let objective = |p: &[f64]| {
            let params = GarchParams {
                omega: p[0],
                alpha: p[1],
                beta: p[2],
            };
            if params.persistence() >= STATIONARITY_LIMIT {
                return 1e10 + params.persistence();
            }
            negative_log_likelihood(&unit, &params.variance_path(&unit, 1.0))
        };
        let bounds = Bounds {
            lower: vec![1e-6, 1e-6, 0.0],
            upper: vec![1.0, 0.5, STATIONARITY_LIMIT],
        };
        let minimum = optimize::nelder_mead(
            objective,
            &[0.1, 0.1, 0.8],
            &bounds,
            self.options.max_iterations,
            1e-6,
        );

        if !minimum.converged {
            diagnostics.push(Diagnostic::convergence(
                "garch",
                minimum.iterations,
                "likelihood maximisation hit the iteration budget",
            ));
            fall_back("GARCH fit did not converge".to_string(), diagnostics);
            return None;
        }
        let unit_params = GarchParams {
            omega: minimum.point[0],
            alpha: minimum.point[1],
            beta: minimum.point[2],
        };
        if !minimum.value.is_finite()
            || unit_params.persistence() >= STATIONARITY_LIMIT
            || unit_params.omega <= 0.0
        {
            fall_back(
                format!(
                    "fitted parameters are not stationary (alpha + beta = {:.4})",
                    unit_params.persistence()
                ),
                diagnostics,
            );
            return None;
        }

        let params = GarchParams {
            omega: unit_params.omega * sample_var,
            ..unit_params
        };
        let variance = params.variance_path(returns, sample_var);
        let last_var = variance.last().copied().unwrap_or(sample_var);
        let last_ret = returns.last().copied().unwrap_or(0.0);
        let next = params.omega + params.alpha * last_ret.powi(2) + params.beta * last_var;
        let long_run = params.long_run_variance();
        let persistence = params.persistence();
        let forecast = (0..self.options.horizon)
            .map(|h| long_run + persistence.powi(h as i32) * (next - long_run))
            .collect();

        debug!(
            omega = params.omega,
            alpha = params.alpha,
            beta = params.beta,
            iterations = minimum.iterations,
            "GARCH(1,1) fitted"
        );
        Some(VarianceFit {
            variance,
            persistence,
            forecast,
        })
    }
}

fn negative_log_likelihood(returns: &[f64], variance: &[f64]) -> f64 {
    0.5 * returns
        .iter()
        .zip(variance)
        .map(|(r, v)| v.ln() + r * r / v)
        .sum::<f64>()
}

/// Converts levels into changes.
fn transform_returns(values: &[f64], transform: ReturnsTransform) -> Result<Vec<f64>, AnalyticsError> {
    match transform {
        ReturnsTransform::None => Ok(values.to_vec()),
        ReturnsTransform::Difference => Ok(values.windows(2).map(|w| w[1] - w[0]).collect()),
        ReturnsTransform::Percent => values
            .windows(2)
            .map(|w| {
                if w[0].abs() <= f64::EPSILON {
                    Err(AnalyticsError::invalid_options(
                        "percent returns are undefined when a value is zero",
                    ))
                } else {
                    Ok(100.0 * (w[1] - w[0]) / w[0])
                }
            })
            .collect(),
        ReturnsTransform::Log => {
            if values.iter().any(|v| *v <= 0.0) {
                return Err(AnalyticsError::invalid_options(
                    "log returns need strictly positive values",
                ));
            }
            Ok(values.windows(2).map(|w| (w[1] / w[0]).ln()).collect())
        }
    }
}

/// Splits a volatility path into low/medium/high spans by tercile.
fn detect_regimes(volatility: &[f64], min_length: usize, clip_threshold: f64) -> Vec<Regime> {
    let clipped = stats::robust_clip(volatility, clip_threshold);
    let sorted = stats::sorted(&clipped);
    let low_cut = stats::quantile_sorted(&sorted, 1.0 / 3.0);
    let high_cut = stats::quantile_sorted(&sorted, 2.0 / 3.0);
    let level_of = |v: f64| {
        if v <= low_cut {
            RegimeLevel::Low
        } else if v <= high_cut {
            RegimeLevel::Medium
        } else {
            RegimeLevel::High
        }
    };

    let mut runs: Vec<(RegimeLevel, usize, usize)> = Vec::new();
    for (i, v) in clipped.iter().enumerate() {
        let level = level_of(*v);
        match runs.last_mut() {
            Some(last) if last.0 == level => last.2 = i,
            _ => runs.push((level, i, i)),
        }
    }

    let mut merged: Vec<(RegimeLevel, usize, usize)> = Vec::new();
    let mut leading_start: Option<usize> = None;
    for (level, start, end) in runs.iter().copied() {
        if end - start + 1 < min_length {
            match merged.last_mut() {
                Some(last) => last.2 = end,
                None => {
                    leading_start.get_or_insert(start);
                }
            }
            continue;
        }
        let start = leading_start.take().unwrap_or(start);
        match merged.last_mut() {
            Some(last) if last.0 == level => last.2 = end,
            _ => merged.push((level, start, end)),
        }
    }
    if merged.is_empty() && !volatility.is_empty() {
        // Every run was short; report one span at the most common level.
        let level = [RegimeLevel::Low, RegimeLevel::Medium, RegimeLevel::High]
            .into_iter()
            .max_by_key(|l| clipped.iter().filter(|v| level_of(**v) == *l).count())
            .unwrap_or(RegimeLevel::Low);
        merged.push((level, 0, volatility.len() - 1));
    }

    merged
        .into_iter()
        .map(|(level, start, end)| Regime {
            level,
            start,
            end,
            mean_volatility: stats::mean(&volatility[start..=end]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn create_random_walk(n: usize, seed: u64) -> TimeSeries {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut level = 1500.0;
        let values = (0..n)
            .map(|_| {
                level += rng.gen_range(-15.0..15.0);
                level
            })
            .collect();
        TimeSeries::new(values)
    }

    fn analyzer(options: VolatilityOptions) -> VolatilityAnalyzer {
        VolatilityAnalyzer::new(options).unwrap()
    }

    #[test]
    fn test_constant_series_has_near_zero_volatility() {
        let series = TimeSeries::new(vec![1500.0; 40]);
        for model in [VolatilityModel::Ewma, VolatilityModel::Historical, VolatilityModel::Garch] {
            let estimate = analyzer(VolatilityOptions {
                model,
                ..Default::default()
            })
            .analyze(&series)
            .unwrap();
            assert_eq!(estimate.series.len(), 40);
            assert!(estimate.series.iter().all(|v| *v >= 0.0 && *v < 1e-3));
        }
    }

    #[test]
    fn test_garch_on_constant_series_falls_back() {
        let series = TimeSeries::new(vec![1500.0; 40]);
        let estimate = analyzer(VolatilityOptions {
            model: VolatilityModel::Garch,
            ..Default::default()
        })
        .analyze(&series)
        .unwrap();
        assert_eq!(estimate.model, VolatilityModel::Ewma);
        assert_eq!(estimate.requested_model, VolatilityModel::Garch);
        assert!(matches!(estimate.diagnostics[0], Diagnostic::Fallback { .. }));
    }

    #[test]
    fn test_exhausted_budget_reports_convergence_warning() {
        let estimate = analyzer(VolatilityOptions {
            model: VolatilityModel::Garch,
            max_iterations: 1,
            ..Default::default()
        })
        .analyze(&create_random_walk(120, 7))
        .unwrap();
        assert_eq!(estimate.model, VolatilityModel::Ewma);
        assert!(estimate.diagnostics.iter().any(|d| d.is_convergence_warning()));
        assert!(estimate.series.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn test_garch_result_is_stationary_or_flagged() {
        let estimate = analyzer(VolatilityOptions {
            model: VolatilityModel::Garch,
            max_iterations: 2_000,
            ..Default::default()
        })
        .analyze(&create_random_walk(400, 11))
        .unwrap();
        match estimate.model {
            VolatilityModel::Garch => {
                assert!(estimate.persistence < STATIONARITY_LIMIT);
                assert!(estimate.diagnostics.is_empty());
            }
            _ => assert!(!estimate.diagnostics.is_empty()),
        }
        assert_eq!(estimate.forecast.len(), 5);
    }

    /// Levels whose differences follow GARCH(1,1) with standard normal shocks.
    fn create_garch_process(n: usize, omega: f64, alpha: f64, beta: f64, seed: u64) -> TimeSeries {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut variance = omega / (1.0 - alpha - beta);
        let mut previous = 0.0;
        let mut level = 1500.0;
        let values = (0..n)
            .map(|_| {
                variance = omega + alpha * previous * previous + beta * variance;
                let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
                let u2: f64 = rng.r#gen();
                let shock = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
                previous = variance.sqrt() * shock;
                level += previous;
                level
            })
            .collect();
        TimeSeries::new(values)
    }

    #[test]
    fn test_garch_fits_simulated_process() {
        let estimate = analyzer(VolatilityOptions {
            model: VolatilityModel::Garch,
            ..Default::default()
        })
        .analyze(&create_garch_process(500, 0.05, 0.1, 0.85, 17))
        .unwrap();
        assert_eq!(estimate.model, VolatilityModel::Garch);
        assert!(estimate.persistence < 0.999);
        assert!(estimate.diagnostics.is_empty(), "{:?}", estimate.diagnostics);
    }

    #[test]
    fn test_ewma_reports_lambda_and_risk() {
        let estimate = analyzer(VolatilityOptions::default())
            .analyze(&create_random_walk(60, 3))
            .unwrap();
        assert_eq!(estimate.persistence, 0.94);
        let risk = estimate.risk_metrics.unwrap();
        assert!(risk.expected_shortfall >= risk.value_at_risk);
        assert!(risk.value_at_risk > 0.0);
        assert!(estimate.forecast.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_historical_window_tracks_dispersion() {
        let mut values = vec![1500.0];
        for i in 1..60 {
            let step = if i < 30 { 1.0 } else { 20.0 };
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            values.push(values[i - 1] + sign * step);
        }
        let estimate = analyzer(VolatilityOptions {
            model: VolatilityModel::Historical,
            window: 10,
            ..Default::default()
        })
        .analyze(&TimeSeries::new(values))
        .unwrap();
        assert!(estimate.series[55] > 5.0 * estimate.series[20]);
        assert!((0.0..=1.0).contains(&estimate.persistence));
    }

    #[test]
    fn test_regimes_cover_the_series() {
        let mut values = vec![1500.0];
        for i in 1..90 {
            let step = match i {
                0..=29 => 1.0,
                30..=59 => 25.0,
                _ => 5.0,
            };
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            values.push(values[i - 1] + sign * step);
        }
        let estimate = analyzer(VolatilityOptions {
            model: VolatilityModel::Historical,
            window: 5,
            regimes: true,
            ..Default::default()
        })
        .analyze(&TimeSeries::new(values))
        .unwrap();
        let regimes = estimate.regimes.unwrap();
        assert_eq!(regimes.first().unwrap().start, 0);
        assert_eq!(regimes.last().unwrap().end, 89);
        for pair in regimes.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        assert!(regimes.iter().any(|r| r.level == RegimeLevel::High));
    }

    #[test]
    fn test_log_returns_need_positive_values() {
        let mut values = vec![10.0; 35];
        values[3] = 0.0;
        let result = analyzer(VolatilityOptions {
            returns: ReturnsTransform::Log,
            ..Default::default()
        })
        .analyze(&TimeSeries::new(values));
        assert!(matches!(result, Err(AnalyticsError::Configuration(_))));
    }

    #[test]
    fn test_rejects_short_series() {
        let series = TimeSeries::new((0..29).map(|i| i as f64).collect());
        assert!(matches!(
            analyzer(VolatilityOptions::default()).analyze(&series),
            Err(AnalyticsError::Validation(_))
        ));
    }

    #[test]
    fn test_merge_short_regime_runs() {
        let mut vol = vec![1.0; 10];
        vol.extend([5.0, 5.0]);
        vol.extend(vec![9.0; 10]);
        let regimes = detect_regimes(&vol, 5, 50.0);
        assert!(regimes.iter().all(|r| r.end - r.start + 1 >= 5));
        assert_eq!(regimes.last().unwrap().end, vol.len() - 1);
    }
}
