//! Diagonal-covariance Gaussian mixture fitted by expectation-maximisation.

use super::kmeans;
use crate::stats;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

/// Added to every component variance to keep the likelihood bounded.
const VARIANCE_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone)]
pub(crate) struct MixtureFit {
    pub labels: Vec<usize>,
    /// `probabilities[i][c]`: responsibility of component `c` for point `i`.
    pub probabilities: Vec<Vec<f64>>,
    pub log_likelihood: f64,
    pub bic: f64,
    pub converged: bool,
    pub iterations: usize,
}

struct Component {
    weight: f64,
    mean: Vec<f64>,
    variance: Vec<f64>,
}

impl Component {
    fn log_density(&self, point: &[f64]) -> f64 {
        point
            .iter()
            .zip(&self.mean)
            .zip(&self.variance)
            .map(|((x, m), v)| -0.5 * ((2.0 * PI * v).ln() + (x - m).powi(2) / v))
            .sum()
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn m_step(data: &[Vec<f64>], resp: &[Vec<f64>], k: usize) -> Vec<Component> {
    let n = data.len();
    let dim = data.first().map(|r| r.len()).unwrap_or(0);
    (0..k)
        .map(|c| {
            let total: f64 = resp.iter().map(|r| r[c]).sum::<f64>().max(f64::MIN_POSITIVE);
            let mean: Vec<f64> = (0..dim)
                .map(|d| resp.iter().zip(data).map(|(r, x)| r[c] * x[d]).sum::<f64>() / total)
                .collect();
            let variance = (0..dim)
                .map(|d| {
                    resp.iter()
                        .zip(data)
                        .map(|(r, x)| r[c] * (x[d] - mean[d]).powi(2))
                        .sum::<f64>()
                        / total
                        + VARIANCE_FLOOR
                })
                .collect();
            Component {
                weight: total / n as f64,
                mean,
                variance,
            }
        })
        .collect()
}

/// Fits `k` components, initialised from a single k-means run.
pub(crate) fn fit(
    data: &[Vec<f64>],
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    rng: &mut ChaCha8Rng,
) -> MixtureFit {
    let n = data.len();
    let dim = data.first().map(|r| r.len()).unwrap_or(0);
    let start = kmeans::fit(data, k, max_iterations, tolerance, 1, rng);
    let mut resp: Vec<Vec<f64>> = start
        .labels
        .iter()
        .map(|&l| (0..k).map(|c| if c == l { 1.0 } else { 0.0 }).collect())
        .collect();

    let mut log_likelihood = f64::NEG_INFINITY;
    let mut converged = false;
    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;
        let components = m_step(data, &resp, k);

        let mut total = 0.0;
        for (point, row) in data.iter().zip(resp.iter_mut()) {
            let logs: Vec<f64> = components
                .iter()
                .map(|c| c.weight.max(f64::MIN_POSITIVE).ln() + c.log_density(point))
                .collect();
            let norm = log_sum_exp(&logs);
            total += norm;
            for (r, l) in row.iter_mut().zip(&logs) {
                *r = (l - norm).exp();
            }
        }

        let change = (total - log_likelihood).abs();
        log_likelihood = total;
        if change < tolerance * (1.0 + total.abs()) {
            converged = true;
            break;
        }
    }

    let labels = resp
        .iter()
        .map(|row| {
            (0..k)
                .max_by(|&a, &b| row[a].total_cmp(&row[b]).then(b.cmp(&a)))
                .unwrap_or(0)
        })
        .collect();
    let parameters = (k * 2 * dim + k.saturating_sub(1)) as f64;
    let bic = -2.0 * log_likelihood + parameters * (n as f64).ln();
    MixtureFit {
        labels,
        probabilities: resp,
        log_likelihood,
        bic,
        converged,
        iterations,
    }
}

/// Fits `k = 1..=max_k` and keeps the model with the lowest BIC.
pub(crate) fn fit_best(
    data: &[Vec<f64>],
    max_k: usize,
    max_iterations: usize,
    tolerance: f64,
    rng: &mut ChaCha8Rng,
) -> MixtureFit {
    let mut best: Option<MixtureFit> = None;
    for k in 1..=max_k.max(1) {
        let candidate = fit(data, k, max_iterations, tolerance, rng);
        if best.as_ref().is_none_or(|b| candidate.bic < b.bic) {
            best = Some(candidate);
        }
    }
    best.unwrap_or_else(|| MixtureFit {
        labels: vec![0; data.len()],
        probabilities: vec![vec![1.0]; data.len()],
        log_likelihood: 0.0,
        bic: 0.0,
        converged: true,
        iterations: 0,
    })
}

/// Mean of the per-point maximum responsibilities; 1 for a hard partition.
pub(crate) fn certainty(fit: &MixtureFit) -> f64 {
    let peaks: Vec<f64> = fit
        .probabilities
        .iter()
        .map(|row| row.iter().copied().fold(0.0, f64::max))
        .collect();
    stats::mean(&peaks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn two_groups(rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
        (0..60)
            .map(|i| {
                let centre = if i < 30 { -4.0 } else { 4.0 };
                vec![centre + rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5)]
            })
            .collect()
    }

    #[test]
    fn test_probabilities_are_distributions() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let data = two_groups(&mut rng);
        let fit = fit(&data, 2, 200, 1e-8, &mut rng);
        for row in &fit.probabilities {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
        assert!(certainty(&fit) > 0.99);
        assert_ne!(fit.labels[0], fit.labels[59]);
    }

    #[test]
    fn test_bic_prefers_two_components() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let data = two_groups(&mut rng);
        let fit = fit_best(&data, 4, 200, 1e-8, &mut rng);
        assert_eq!(fit.probabilities[0].len(), 2);
    }
}
