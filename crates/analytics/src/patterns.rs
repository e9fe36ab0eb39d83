use crate::error::AnalyticsError;
use crate::stats;
use configuration::PatternOptions;
use core_types::{validate, Pattern, PatternMethod, PatternType, TimeSeries, VARIANCE_EPSILON};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::TAU;
use tracing::debug;

/// Shortest series the detector accepts.
pub const MIN_LENGTH: usize = 20;

/// Detects periodic components in a single series.
///
/// The series is robustly clipped and linearly detrended before any method
/// runs, so single spikes and steady growth do not register as seasonality.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    options: PatternOptions,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    period: f64,
    strength: f64,
}

impl PatternDetector {
    pub fn new(options: PatternOptions) -> Result<Self, AnalyticsError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &PatternOptions {
        &self.options
    }

    /// Returns detected patterns, strongest first. An empty list is a valid result.
    pub fn detect(&self, series: &TimeSeries) -> Result<Vec<Pattern>, AnalyticsError> {
        validate(series, MIN_LENGTH)?;
        let n = series.len();

        let clipped = stats::robust_clip(&series.values, self.options.clip_threshold);
        let residual = stats::detrend(&clipped);
        let flat_limit = VARIANCE_EPSILON * (1.0 + series.variance());
        if stats::variance(&residual) <= flat_limit {
            debug!(len = n, "residual is flat after detrending; no patterns");
            return Ok(Vec::new());
        }

        let max_period = self
            .options
            .max_period
            .unwrap_or(n / 2)
            .min(n / 2)
            .max(2);

        let mut candidates = match self.options.method {
            PatternMethod::Autocorrelation => autocorrelation_candidates(&residual, max_period),
            PatternMethod::Spectral => spectral_candidates(&residual, max_period),
            PatternMethod::Decomposition => decomposition_candidates(&residual, max_period),
        };
        candidates.retain(|c| c.strength >= self.options.min_strength && c.period > 1.0);
        candidates.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then(a.period.total_cmp(&b.period))
        });

        let step_days = series
            .median_step_days()
            .unwrap_or(self.options.sampling_interval_days);

        let mut accepted: Vec<Candidate> = Vec::new();
        for candidate in candidates {
            if accepted.iter().any(|a| is_harmonic(candidate.period, a.period)) {
                continue;
            }
            accepted.push(candidate);
        }

        let patterns: Vec<Pattern> = accepted
            .into_iter()
            .map(|c| Pattern {
                pattern_type: PatternType::from_period_days(c.period * step_days),
                period: c.period,
                strength: c.strength.clamp(0.0, 1.0),
                phase: peak_phase(&residual, c.period),
            })
            .filter(|p| self.options.accepts(p.pattern_type))
            .take(self.options.max_patterns)
            .collect();

        debug!(
            method = ?self.options.method,
            found = patterns.len(),
            "pattern detection finished"
        );
        Ok(patterns)
    }
}

/// True when `period` repeats (or is a multiple of) an already accepted period.
fn is_harmonic(period: f64, accepted: f64) -> bool {
    let ratio = period / accepted;
    if ratio < 0.9 {
        return false;
    }
    (ratio - ratio.round()).abs() < 0.1
}

/// Angular position of the seasonal peak within one cycle, measured from index 0.
fn peak_phase(residual: &[f64], period: f64) -> f64 {
    let p = (period.round() as usize).max(2);
    let mut sums = vec![0.0; p];
    let mut counts = vec![0usize; p];
    for (i, v) in residual.iter().enumerate() {
        sums[i % p] += v;
        counts[i % p] += 1;
    }
    let peak = (0..p)
        .max_by(|&a, &b| {
            let ma = sums[a] / counts[a].max(1) as f64;
            let mb = sums[b] / counts[b].max(1) as f64;
            ma.total_cmp(&mb).then(b.cmp(&a))
        })
        .unwrap_or(0);
    (TAU * peak as f64 / p as f64).rem_euclid(TAU)
}

fn autocorrelation_candidates(residual: &[f64], max_period: usize) -> Vec<Candidate> {
    let acf = stats::autocorrelation(residual, max_period + 1);
    let last = acf.len().saturating_sub(1).min(max_period);
    (2..=last)
        .filter(|&k| {
            let right_ok = k + 1 >= acf.len() || acf[k] >= acf[k + 1];
            acf[k] > acf[k - 1] && right_ok && acf[k] > 0.0
        })
        .map(|k| Candidate {
            period: k as f64,
            strength: acf[k].min(1.0),
        })
        .collect()
}

fn spectral_candidates(residual: &[f64], max_period: usize) -> Vec<Candidate> {
    let n = residual.len();
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<Complex<f64>> = residual.iter().map(|&x| Complex::new(x, 0.0)).collect();
    fft.process(&mut buffer);

    let half = n / 2;
    let power: Vec<f64> = buffer[..=half].iter().map(|c| c.norm_sqr()).collect();
    let total: f64 = power[1..].iter().sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for j in 1..=half {
        let left = power[j - 1];
        let right = if j < half { power[j + 1] } else { 0.0 };
        if power[j] <= left || power[j] < right {
            continue;
        }
        // Parabolic refinement of the peak frequency between bins.
        let frequency = if j < half {
            let denom = power[j - 1] - 2.0 * power[j] + power[j + 1];
            let delta = if denom.abs() > f64::EPSILON {
                (0.5 * (power[j - 1] - power[j + 1]) / denom).clamp(-0.5, 0.5)
            } else {
                0.0
            };
            j as f64 + delta
        } else {
            j as f64
        };
        let period = n as f64 / frequency;
        if period < 2.0 || period > max_period as f64 {
            continue;
        }
        // Leakage spreads a non-integer-bin period over its neighbours.
        let neighbours = (if j > 1 { left } else { 0.0 }) + right;
        out.push(Candidate {
            period,
            strength: ((power[j] + neighbours) / total).min(1.0),
        });
    }
    out
}

/// Periods whose seasonal profile stands out from the detrended residual.
///
/// Strength is the seasonal component's amplitude expressed as its share of
/// the residual variance (adjusted R² of the per-phase means), so a larger
/// swing against the same noise always scores higher while staying in `[0, 1]`.
fn decomposition_candidates(residual: &[f64], max_period: usize) -> Vec<Candidate> {
    let n = residual.len();
    let total_var = stats::variance(residual);
    let upper = max_period.min(n / 2);
    let mut strengths = vec![0.0; upper + 1];
    for (m, slot) in strengths.iter_mut().enumerate().skip(2) {
        *slot = seasonal_strength(residual, m, total_var);
    }
    (2..=upper)
        .filter(|&m| {
            let left = if m > 2 { strengths[m - 1] } else { 0.0 };
            let right = if m < upper { strengths[m + 1] } else { 0.0 };
            strengths[m] > left && strengths[m] >= right
        })
        .map(|m| Candidate {
            period: m as f64,
            strength: strengths[m],
        })
        .collect()
}

/// Share of variance explained by per-phase means, adjusted for the number of phases.
fn seasonal_strength(residual: &[f64], m: usize, total_var: f64) -> f64 {
    let n = residual.len();
    if n <= m || total_var <= 0.0 {
        return 0.0;
    }
    let mut sums = vec![0.0; m];
    let mut counts = vec![0usize; m];
    for (i, v) in residual.iter().enumerate() {
        sums[i % m] += v;
        counts[i % m] += 1;
    }
    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(s, c)| s / (*c).max(1) as f64)
        .collect();
    let offset = stats::mean(&means);
    let remainder: Vec<f64> = residual
        .iter()
        .enumerate()
        .map(|(i, v)| v - (means[i % m] - offset))
        .collect();
    let r2 = 1.0 - stats::variance(&remainder) / total_var;
    let adjusted = 1.0 - (1.0 - r2) * (n - 1) as f64 / (n - m) as f64;
    adjusted.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_weekly_series(cycles: usize) -> TimeSeries {
        let values = (0..cycles * 7)
            .map(|i| 1500.0 + 0.5 * i as f64 + 20.0 * (TAU * i as f64 / 7.0).sin())
            .collect();
        TimeSeries::new(values)
    }

    fn detector(method: PatternMethod) -> PatternDetector {
        PatternDetector::new(PatternOptions {
            method,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_autocorrelation_finds_weekly() {
        let patterns = detector(PatternMethod::Autocorrelation)
            .detect(&create_weekly_series(12))
            .unwrap();
        assert!(!patterns.is_empty());
        assert_eq!(patterns[0].period, 7.0);
        assert_eq!(patterns[0].pattern_type, PatternType::Weekly);
        assert!(patterns[0].strength > 0.5 && patterns[0].strength <= 1.0);
        // Multiples of the weekly period are suppressed.
        assert!(patterns.iter().all(|p| p.period != 14.0 && p.period != 21.0));
    }

    #[test]
    fn test_spectral_finds_weekly() {
        let patterns = detector(PatternMethod::Spectral)
            .detect(&create_weekly_series(12))
            .unwrap();
        assert!(!patterns.is_empty());
        assert!((patterns[0].period - 7.0).abs() < 0.5);
        assert_eq!(patterns[0].pattern_type, PatternType::Weekly);
    }

    #[test]
    fn test_decomposition_finds_weekly() {
        let patterns = detector(PatternMethod::Decomposition)
            .detect(&create_weekly_series(12))
            .unwrap();
        assert!(!patterns.is_empty());
        assert_eq!(patterns[0].period, 7.0);
        assert!(patterns[0].strength > 0.9);
    }

    #[test]
    fn test_decomposition_strength_grows_with_amplitude() {
        let residual = |amplitude: f64| -> Vec<f64> {
            (0..77)
                .map(|i| amplitude * (TAU * i as f64 / 7.0).sin() + ((i * 37) % 11) as f64 - 5.0)
                .collect()
        };
        let strengths: Vec<f64> = [2.0, 5.0, 20.0]
            .iter()
            .map(|a| {
                let r = residual(*a);
                seasonal_strength(&r, 7, stats::variance(&r))
            })
            .collect();
        assert!(strengths.windows(2).all(|w| w[0] < w[1]), "{:?}", strengths);
        assert!(strengths.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!(strengths[2] > 0.9);
    }

    #[test]
    fn test_linear_trend_has_no_patterns() {
        let series = TimeSeries::new((0..24).map(|i| 1500.0 + i as f64).collect());
        for method in [
            PatternMethod::Autocorrelation,
            PatternMethod::Spectral,
            PatternMethod::Decomposition,
        ] {
            assert!(detector(method).detect(&series).unwrap().is_empty());
        }
    }

    #[test]
    fn test_phase_is_in_range() {
        let patterns = detector(PatternMethod::Autocorrelation)
            .detect(&create_weekly_series(8))
            .unwrap();
        for p in patterns {
            assert!((0.0..TAU).contains(&p.phase));
        }
    }

    #[test]
    fn test_short_series_is_rejected() {
        let series = TimeSeries::new(vec![1.0; 10]);
        assert!(matches!(
            detector(PatternMethod::Spectral).detect(&series),
            Err(AnalyticsError::Validation(_))
        ));
    }

    #[test]
    fn test_type_filter() {
        let detector = PatternDetector::new(PatternOptions {
            pattern_types: vec![PatternType::Monthly],
            ..Default::default()
        })
        .unwrap();
        assert!(detector.detect(&create_weekly_series(12)).unwrap().is_empty());
    }
}
