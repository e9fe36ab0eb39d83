use crate::error::RiskError;
use core_types::RiskMetrics;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Standard deviations below this are treated as this value in ratios.
pub const SIGMA_FLOOR: f64 = 1e-6;

/// A model of the loss tail of a return distribution.
///
/// Losses are positive numbers: a value-at-risk of 12.0 means a 12-point drop
/// is exceeded with probability `1 - confidence_level`.
pub trait TailRiskModel {
    fn value_at_risk(&self) -> f64;
    fn expected_shortfall(&self) -> f64;
}

fn check_confidence(confidence_level: f64) -> Result<(), RiskError> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(RiskError::InvalidParameters(format!(
            "confidence_level must lie strictly between 0 and 1, got {}",
            confidence_level
        )));
    }
    Ok(())
}

/// Tail measures of a conditional normal distribution.
#[derive(Debug, Clone)]
pub struct ParametricRisk {
    mean: f64,
    sigma: f64,
    confidence_level: f64,
    z: f64,
    density: f64,
}

impl ParametricRisk {
    pub fn new(confidence_level: f64, mean: f64, sigma: f64) -> Result<Self, RiskError> {
        check_confidence(confidence_level)?;
        if !mean.is_finite() || !sigma.is_finite() || sigma < 0.0 {
            return Err(RiskError::InvalidParameters(format!(
                "mean and sigma must be finite with sigma >= 0 (mean={}, sigma={})",
                mean, sigma
            )));
        }
        let standard = Normal::new(0.0, 1.0).map_err(|e| RiskError::Calculation(e.to_string()))?;
        let z = standard.inverse_cdf(confidence_level);
        let density = standard.pdf(z);
        Ok(Self {
            mean,
            sigma: sigma.max(SIGMA_FLOOR),
            confidence_level,
            z,
            density,
        })
    }

    pub fn z_score(&self) -> f64 {
        self.z
    }
}

impl TailRiskModel for ParametricRisk {
    fn value_at_risk(&self) -> f64 {
        self.z * self.sigma - self.mean
    }

    fn expected_shortfall(&self) -> f64 {
        self.sigma * self.density / (1.0 - self.confidence_level) - self.mean
    }
}

/// Tail measures of the empirical return distribution.
#[derive(Debug, Clone)]
pub struct HistoricalRisk {
    sorted: Vec<f64>,
    quantile: f64,
}

impl HistoricalRisk {
    pub fn new(confidence_level: f64, returns: &[f64]) -> Result<Self, RiskError> {
        check_confidence(confidence_level)?;
        if returns.len() < 2 {
            return Err(RiskError::InsufficientReturns {
                required: 2,
                actual: returns.len(),
            });
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(RiskError::Calculation("returns contain non-finite values".to_string()));
        }
        let mut sorted = returns.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        // Linear interpolation between order statistics.
        let position = (sorted.len() - 1) as f64 * (1.0 - confidence_level);
        let lower = position.floor() as usize;
        let upper = (lower + 1).min(sorted.len() - 1);
        let fraction = position - lower as f64;
        let quantile = sorted[lower] + fraction * (sorted[upper] - sorted[lower]);

        Ok(Self { sorted, quantile })
    }
}

impl TailRiskModel for HistoricalRisk {
    fn value_at_risk(&self) -> f64 {
        -self.quantile
    }

    fn expected_shortfall(&self) -> f64 {
        let tail: Vec<f64> = self
            .sorted
            .iter()
            .copied()
            .take_while(|r| *r <= self.quantile)
            .collect();
        if tail.is_empty() {
            return -self.quantile;
        }
        -(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}

/// Builds the full set of risk measures for a return series and the
/// conditional standard deviation of the next step.
pub fn risk_metrics(
    returns: &[f64],
    next_sigma: f64,
    confidence_level: f64,
) -> Result<RiskMetrics, RiskError> {
    let historical = HistoricalRisk::new(confidence_level, returns)?;
    let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;
    let parametric = ParametricRisk::new(confidence_level, mean_return, next_sigma)?;
    let sigma = next_sigma.max(SIGMA_FLOOR);

    let metrics = RiskMetrics {
        confidence_level,
        value_at_risk: parametric.value_at_risk(),
        expected_shortfall: parametric.expected_shortfall(),
        historical_value_at_risk: historical.value_at_risk(),
        historical_expected_shortfall: historical.expected_shortfall(),
        mean_return,
        reward_to_risk: mean_return / sigma,
    };
    tracing::trace!(var = metrics.value_at_risk, es = metrics.expected_shortfall, "risk metrics computed");
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_normal_tail() {
        let risk = ParametricRisk::new(0.95, 0.0, 1.0).unwrap();
        assert!((risk.value_at_risk() - 1.644_853_6).abs() < 1e-5);
        assert!((risk.expected_shortfall() - 2.062_712_9).abs() < 1e-5);
        assert!(risk.expected_shortfall() > risk.value_at_risk());
    }

    #[test]
    fn test_mean_shifts_losses() {
        let risk = ParametricRisk::new(0.99, 3.0, 2.0).unwrap();
        let expected = 2.326_347_9 * 2.0 - 3.0;
        assert!((risk.value_at_risk() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_historical_interpolated_quantile() {
        let returns: Vec<f64> = (-50..50).map(|v| v as f64).collect();
        let risk = HistoricalRisk::new(0.95, &returns).unwrap();
        assert!((risk.value_at_risk() - 45.05).abs() < 1e-9);
        assert!((risk.expected_shortfall() - 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_sigma_is_floored() {
        let metrics = risk_metrics(&[0.0; 40], 0.0, 0.95).unwrap();
        assert!(metrics.value_at_risk >= 0.0);
        assert!(metrics.value_at_risk < 1e-4);
        assert_eq!(metrics.reward_to_risk, 0.0);
        assert_eq!(metrics.historical_value_at_risk, 0.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            ParametricRisk::new(1.0, 0.0, 1.0),
            Err(RiskError::InvalidParameters(_))
        ));
        assert!(matches!(
            HistoricalRisk::new(0.95, &[1.0]),
            Err(RiskError::InsufficientReturns { .. })
        ));
    }
}
