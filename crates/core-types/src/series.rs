use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variance below this is treated as zero.
pub const VARIANCE_EPSILON: f64 = 1e-12;

/// Ordered numeric observations, one per logical time step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<DateTime<Utc>>>,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            timestamps: None,
        }
    }

    pub fn with_timestamps(values: Vec<f64>, timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            values,
            timestamps: Some(timestamps),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Median spacing between consecutive timestamps, in days.
    pub fn median_step_days(&self) -> Option<f64> {
        let ts = self.timestamps.as_ref()?;
        if ts.len() < 2 {
            return None;
        }
        let mut steps: Vec<f64> = ts
            .windows(2)
            .map(|w| (w[1] - w[0]).num_seconds() as f64 / 86_400.0)
            .collect();
        steps.sort_by(|a, b| a.total_cmp(b));
        Some(steps[steps.len() / 2])
    }
}

/// The gate every analyzer runs its input through.
///
/// Checks length, finiteness and timestamp ordering. Zero variance is a
/// separate check ([`validate_variation`]) because only some analyzers need it.
pub fn validate(series: &TimeSeries, min_length: usize) -> Result<&TimeSeries, ValidationError> {
    if series.is_empty() {
        return Err(ValidationError::Empty);
    }
    if series.len() < min_length {
        return Err(ValidationError::TooShort {
            required: min_length,
            actual: series.len(),
        });
    }
    if let Some(index) = series.values.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::NonFinite { index });
    }
    if let Some(ts) = &series.timestamps {
        if ts.len() != series.len() {
            return Err(ValidationError::TimestampMismatch {
                values: series.len(),
                timestamps: ts.len(),
            });
        }
        if let Some(pos) = ts.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ValidationError::TimestampsNotIncreasing { index: pos + 1 });
        }
    }
    tracing::trace!(len = series.len(), min_length, "series passed validation");
    Ok(series)
}

/// Rejects series whose values do not vary.
pub fn validate_variation(series: &TimeSeries) -> Result<(), ValidationError> {
    if series.variance() <= VARIANCE_EPSILON {
        return Err(ValidationError::ZeroVariance);
    }
    Ok(())
}

/// Validates a set of series that must share a common time axis.
pub fn validate_aligned(series_set: &[TimeSeries], min_length: usize) -> Result<usize, ValidationError> {
    let first = series_set.first().ok_or(ValidationError::Empty)?;
    let len = first.len();
    for (i, series) in series_set.iter().enumerate() {
        validate(series, min_length)?;
        if series.len() != len {
            return Err(ValidationError::DimensionMismatch(format!(
                "series {} has {} observations, expected {}",
                i,
                series.len(),
                len
            )));
        }
    }
    Ok(len)
}

/// Validates a feature matrix (one row per observation) and returns its dimensionality.
pub fn validate_features(rows: &[Vec<f64>], min_rows: usize) -> Result<usize, ValidationError> {
    if rows.is_empty() {
        return Err(ValidationError::Empty);
    }
    if rows.len() < min_rows {
        return Err(ValidationError::TooShort {
            required: min_rows,
            actual: rows.len(),
        });
    }
    let dim = rows[0].len();
    if dim == 0 {
        return Err(ValidationError::DimensionMismatch(
            "feature vectors must have at least one dimension".to_string(),
        ));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(ValidationError::DimensionMismatch(format!(
                "row {} has {} features, expected {}",
                i,
                row.len(),
                dim
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ValidationError::NonFinite { index: i });
        }
    }
    Ok(dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_rejects_short_series() {
        let series = TimeSeries::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            validate(&series, 10),
            Err(ValidationError::TooShort { required: 10, actual: 3 })
        );
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let series = TimeSeries::new(vec![1.0, f64::NAN, 3.0]);
        assert_eq!(validate(&series, 1), Err(ValidationError::NonFinite { index: 1 }));
        let series = TimeSeries::new(vec![1.0, 2.0, f64::INFINITY]);
        assert_eq!(validate(&series, 1), Err(ValidationError::NonFinite { index: 2 }));
    }

    #[test]
    fn test_rejects_unordered_timestamps() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = vec![start, start + Duration::days(1), start + Duration::days(1)];
        let series = TimeSeries::with_timestamps(vec![1.0, 2.0, 3.0], ts);
        assert_eq!(
            validate(&series, 1),
            Err(ValidationError::TimestampsNotIncreasing { index: 2 })
        );
    }

    #[test]
    fn test_rejects_timestamp_length_mismatch() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let series = TimeSeries::with_timestamps(vec![1.0, 2.0], vec![start]);
        assert!(matches!(
            validate(&series, 1),
            Err(ValidationError::TimestampMismatch { .. })
        ));
    }

    #[test]
    fn test_zero_variance_gate() {
        let flat = TimeSeries::new(vec![1500.0; 20]);
        assert!(validate(&flat, 10).is_ok());
        assert_eq!(validate_variation(&flat), Err(ValidationError::ZeroVariance));
    }

    #[test]
    fn test_median_step_days() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts: Vec<_> = (0..5).map(|i| start + Duration::weeks(i)).collect();
        let series = TimeSeries::with_timestamps(vec![0.0; 5], ts);
        assert!((series.median_step_days().unwrap() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_feature_validation() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            validate_features(&rows, 1),
            Err(ValidationError::DimensionMismatch(_))
        ));
        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(validate_features(&rows, 2), Ok(2));
    }
}
