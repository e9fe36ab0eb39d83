//! Numeric helpers shared by the analyzers.

use crate::error::AnalyticsError;
use core_types::VARIANCE_EPSILON;
use statrs::distribution::{ContinuousCDF, Normal};

/// Converts a median absolute deviation into a consistent estimate of sigma.
pub(crate) const MAD_SCALE: f64 = 1.4826;

/// Converts an interquartile range into a consistent estimate of sigma.
pub(crate) const IQR_SCALE: f64 = 1.349;

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Sample standard deviation (n - 1 denominator).
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
}

pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Linear-interpolated quantile of an ascending slice.
pub(crate) fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let position = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = position - lower as f64;
    sorted[lower] + fraction * (sorted[upper] - sorted[lower])
}

pub(crate) fn median(values: &[f64]) -> f64 {
    quantile_sorted(&sorted(values), 0.5)
}

/// Raw (unscaled) median absolute deviation around `center`.
pub(crate) fn mad(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Location and scale estimates that tolerate outliers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RobustScale {
    pub center: f64,
    /// Zero when the values carry no spread by any of the estimators.
    pub scale: f64,
}

impl RobustScale {
    /// Median with scaled MAD, falling back to IQR and then to the standard deviation.
    pub fn of(values: &[f64]) -> Self {
        let s = sorted(values);
        let center = quantile_sorted(&s, 0.5);
        let tolerance = VARIANCE_EPSILON.sqrt() * (1.0 + center.abs());

        let mad_scale = MAD_SCALE * mad(values, center);
        if mad_scale > tolerance {
            return Self { center, scale: mad_scale };
        }
        let iqr_scale = (quantile_sorted(&s, 0.75) - quantile_sorted(&s, 0.25)) / IQR_SCALE;
        if iqr_scale > tolerance {
            return Self { center, scale: iqr_scale };
        }
        let std = std_dev(values);
        if std > tolerance {
            return Self { center, scale: std };
        }
        Self { center, scale: 0.0 }
    }

    /// Signed robust z-score; zero when the scale is degenerate.
    pub fn z(&self, value: f64) -> f64 {
        if self.scale > 0.0 {
            (value - self.center) / self.scale
        } else {
            0.0
        }
    }
}

/// Clips values to `median ± threshold * 1.4826 * MAD`. A zero MAD leaves the values untouched.
pub(crate) fn robust_clip(values: &[f64], threshold: f64) -> Vec<f64> {
    let center = median(values);
    let spread = MAD_SCALE * mad(values, center);
    if spread <= 0.0 {
        return values.to_vec();
    }
    let (lo, hi) = (center - threshold * spread, center + threshold * spread);
    values.iter().map(|v| v.clamp(lo, hi)).collect()
}

/// Ordinary least squares fit of `values` against `0..n`. Returns `(intercept, slope)`.
pub(crate) fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n < 2 {
        return (values.first().copied().unwrap_or(0.0), 0.0);
    }
    let t_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dt = i as f64 - t_mean;
        sxy += dt * (y - y_mean);
        sxx += dt * dt;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    (y_mean - slope * t_mean, slope)
}

/// Residuals of the OLS linear trend.
pub(crate) fn detrend(values: &[f64]) -> Vec<f64> {
    let (intercept, slope) = linear_fit(values);
    values
        .iter()
        .enumerate()
        .map(|(i, y)| y - (intercept + slope * i as f64))
        .collect()
}

/// Sample autocorrelation for lags `0..=max_lag`. All zeros beyond lag 0 when the input is flat.
pub(crate) fn autocorrelation(values: &[f64], max_lag: usize) -> Vec<f64> {
    let n = values.len();
    let max_lag = max_lag.min(n.saturating_sub(1));
    let m = mean(values);
    let denom: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    let mut acf = vec![0.0; max_lag + 1];
    acf[0] = 1.0;
    if denom <= VARIANCE_EPSILON {
        return acf;
    }
    for (k, slot) in acf.iter_mut().enumerate().skip(1) {
        let cov: f64 = (0..n - k).map(|i| (values[i] - m) * (values[i + k] - m)).sum();
        *slot = cov / denom;
    }
    acf
}

/// Ranks with ties assigned their average rank (1-based).
pub(crate) fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut out = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            out[idx] = rank;
        }
        i = j + 1;
    }
    out
}

/// Two-sided standard normal critical value for a confidence level.
pub(crate) fn normal_critical(confidence_level: f64) -> Result<f64, AnalyticsError> {
    let standard = Normal::new(0.0, 1.0).map_err(|e| AnalyticsError::Calculation(e.to_string()))?;
    Ok(standard.inverse_cdf(0.5 + confidence_level / 2.0))
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

pub(crate) fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Z-scores every column; columns without spread become zeros.
pub(crate) fn standardize_columns(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dim = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut out = rows.to_vec();
    for d in 0..dim {
        let column: Vec<f64> = rows.iter().map(|r| r[d]).collect();
        let m = mean(&column);
        let s = std_dev(&column);
        for row in out.iter_mut() {
            row[d] = if s > VARIANCE_EPSILON.sqrt() { (row[d] - m) / s } else { 0.0 };
        }
    }
    out
}

/// Column means of the rows selected by `members`.
pub(crate) fn centroid(rows: &[Vec<f64>], members: impl Iterator<Item = usize>) -> Vec<f64> {
    let dim = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut sum = vec![0.0; dim];
    let mut count = 0usize;
    for i in members {
        for (s, v) in sum.iter_mut().zip(&rows[i]) {
            *s += v;
        }
        count += 1;
    }
    if count > 0 {
        for s in sum.iter_mut() {
            *s /= count as f64;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let s = vec![1.0, 2.0, 3.0, 4.0];
        assert!((quantile_sorted(&s, 0.5) - 2.5).abs() < 1e-12);
        assert_eq!(quantile_sorted(&s, 0.0), 1.0);
        assert_eq!(quantile_sorted(&s, 1.0), 4.0);
    }

    #[test]
    fn test_robust_scale_falls_back() {
        // MAD is zero here (most values equal), IQR is not.
        let values = vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0];
        let scale = RobustScale::of(&values);
        assert_eq!(scale.center, 0.0);
        assert!(scale.scale > 0.0);

        let flat = RobustScale::of(&[7.0; 12]);
        assert_eq!(flat.scale, 0.0);
        assert_eq!(flat.z(7.0), 0.0);
    }

    #[test]
    fn test_robust_clip_limits_spike() {
        let mut values: Vec<f64> = (0..20).map(|i| (i % 4) as f64).collect();
        values[10] = 1_000.0;
        let clipped = robust_clip(&values, 3.5);
        assert!(clipped[10] < 10.0);
        assert_eq!(clipped[3], values[3]);
    }

    #[test]
    fn test_detrend_removes_line() {
        let values: Vec<f64> = (0..24).map(|i| 1500.0 + 2.0 * i as f64).collect();
        let (a, b) = linear_fit(&values);
        assert!((a - 1500.0).abs() < 1e-9);
        assert!((b - 2.0).abs() < 1e-12);
        assert!(detrend(&values).iter().all(|r| r.abs() < 1e-9));
    }

    #[test]
    fn test_average_ranks() {
        assert_eq!(ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_autocorrelation_of_period() {
        let values: Vec<f64> = (0..70).map(|i| if i % 7 == 0 { 5.0 } else { 0.0 }).collect();
        let acf = autocorrelation(&values, 14);
        assert!(acf[7] > acf[6]);
        assert!(acf[7] > 0.8);
    }

    #[test]
    fn test_normal_critical_value() {
        assert!((normal_critical(0.95).unwrap() - 1.959_964).abs() < 1e-5);
    }
}
