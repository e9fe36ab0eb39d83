//! Grouping of feature vectors.
//!
//! Four algorithm families share one entry point. Labels are always
//! canonicalized in order of first appearance, so a fixed seed reproduces the
//! same labels and not merely the same partition.

mod density;
pub(crate) mod hierarchical;
mod kmeans;
mod mixture;
pub(crate) mod validation;

use crate::error::AnalyticsError;
use crate::stats;
use configuration::ClusteringOptions;
use core_types::{validate_features, ClusterAssignment, ClusteringAlgorithm, Diagnostic};
use hierarchical::Dendrogram;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};
use validation::{canonicalize, silhouette, DistanceMatrix};

/// Fewest observations the analyzer accepts.
pub const MIN_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone)]
pub struct ClusteringAnalyzer {
    options: ClusteringOptions,
}

/// Raw algorithm output before canonicalization.
struct Partition {
    labels: Vec<usize>,
    probabilities: Option<Vec<Vec<f64>>>,
    noise: Vec<bool>,
    converged: bool,
    diagnostics: Vec<Diagnostic>,
}

impl Partition {
    fn hard(labels: Vec<usize>) -> Self {
        Self {
            labels,
            probabilities: None,
            noise: Vec::new(),
            converged: true,
            diagnostics: Vec::new(),
        }
    }
}

impl ClusteringAnalyzer {
    pub fn new(options: ClusteringOptions) -> Result<Self, AnalyticsError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &ClusteringOptions {
        &self.options
    }

    /// Whether repeated calls on the same input give the same labels.
    pub fn is_deterministic(&self) -> bool {
        self.options.seed.is_some()
            || matches!(
                self.options.algorithm,
                ClusteringAlgorithm::Hierarchical | ClusteringAlgorithm::Density
            )
    }

    pub fn cluster(&self, features: &[Vec<f64>]) -> Result<ClusterAssignment, AnalyticsError> {
        validate_features(features, MIN_OBSERVATIONS)?;
        let m = features.len();
        if let Some(k) = self.options.k {
            if k > m {
                return Err(AnalyticsError::invalid_options(format!(
                    "k = {} exceeds the number of observations ({})",
                    k, m
                )));
            }
        }

        let data = if self.options.standardize {
            stats::standardize_columns(features)
        } else {
            features.to_vec()
        };
        let distances = DistanceMatrix::euclidean(&data);
        let mut rng = match self.options.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let partition = match self.options.algorithm {
            ClusteringAlgorithm::KMeans => self.kmeans(&data, &distances, &mut rng),
            ClusteringAlgorithm::Hierarchical => self.hierarchical(&distances),
            ClusteringAlgorithm::Density => {
                let fit = density::dbscan(&distances, self.options.eps, self.options.min_points);
                debug!(eps = fit.eps, clusters = fit.clusters, "density clustering finished");
                Partition {
                    noise: fit.noise,
                    ..Partition::hard(fit.labels)
                }
            }
            ClusteringAlgorithm::Distribution => self.distribution(&data, &mut rng),
        };

        let (labels, k, origins) = canonicalize(&partition.labels);
        let probabilities = partition.probabilities.map(|rows| {
            rows.into_iter()
                .map(|row| {
                    let kept: Vec<f64> = origins.iter().map(|&o| row.get(o).copied().unwrap_or(0.0)).collect();
                    let total: f64 = kept.iter().sum();
                    if total > 0.0 {
                        kept.into_iter().map(|p| p / total).collect()
                    } else {
                        vec![1.0 / k as f64; k]
                    }
                })
                .collect()
        });
        let centroids = (0..k)
            .map(|c| stats::centroid(features, (0..m).filter(|&i| labels[i] == c)))
            .collect();
        let validation_score = silhouette(&distances, &labels, k);

        if !partition.converged {
            warn!(algorithm = ?self.options.algorithm, "clustering did not converge");
        }
        debug!(algorithm = ?self.options.algorithm, k, validation_score, "clustering finished");
        Ok(ClusterAssignment {
            algorithm: self.options.algorithm,
            k,
            labels,
            centroids,
            validation_score,
            probabilities,
            noise: partition.noise,
            converged: partition.converged,
            diagnostics: partition.diagnostics,
        })
    }

    /// Candidate cluster counts for automatic selection.
    fn auto_range(&self, m: usize) -> std::ops::RangeInclusive<usize> {
        2..=self.options.max_k.min(m.saturating_sub(1))
    }

    fn kmeans(&self, data: &[Vec<f64>], distances: &DistanceMatrix, rng: &mut ChaCha8Rng) -> Partition {
        let opts = &self.options;
        let run = |k: usize, rng: &mut ChaCha8Rng| {
            kmeans::fit(data, k, opts.max_iterations, opts.tolerance, opts.n_init, rng)
        };
        let fit = match opts.k {
            Some(k) => run(k, rng),
            None => {
                let mut best: Option<(f64, kmeans::KMeansFit)> = None;
                for k in self.auto_range(data.len()) {
                    let fit = run(k, rng);
                    let score = silhouette(distances, &fit.labels, k);
                    if best.as_ref().is_none_or(|(s, _)| score > *s) {
                        best = Some((score, fit));
                    }
                }
                match best {
                    Some((_, fit)) => fit,
                    None => run(1, rng),
                }
            }
        };

        let mut partition = Partition {
            converged: fit.converged,
            ..Partition::hard(fit.labels)
        };
        if !fit.converged {
            partition.diagnostics.push(Diagnostic::convergence(
                "k_means",
                fit.iterations,
                "centroids still moving at the iteration budget",
            ));
        }
        partition
    }

    fn hierarchical(&self, distances: &DistanceMatrix) -> Partition {
        let tree = Dendrogram::build(distances, self.options.linkage);
        let labels = match (self.options.k, self.options.cut_height) {
            (Some(k), _) => tree.labels_for_k(k),
            (None, Some(height)) => tree.labels_for_height(height),
            (None, None) => best_cut(&tree, distances, self.auto_range(tree.len())),
        };
        Partition::hard(labels)
    }

    fn distribution(&self, data: &[Vec<f64>], rng: &mut ChaCha8Rng) -> Partition {
        let opts = &self.options;
        let fit = match opts.k {
            Some(k) => mixture::fit(data, k, opts.max_iterations, opts.tolerance, rng),
            None => {
                let upper = opts.max_k.min(data.len().saturating_sub(1)).max(1);
                mixture::fit_best(data, upper, opts.max_iterations, opts.tolerance, rng)
            }
        };
        debug!(
            bic = fit.bic,
            log_likelihood = fit.log_likelihood,
            certainty = mixture::certainty(&fit),
            "mixture fitted"
        );
        let mut diagnostics = Vec::new();
        if !fit.converged {
            diagnostics.push(Diagnostic::convergence(
                "gaussian_mixture",
                fit.iterations,
                "log-likelihood still improving at the iteration budget",
            ));
        }
        Partition {
            labels: fit.labels,
            probabilities: Some(fit.probabilities),
            noise: Vec::new(),
            converged: fit.converged,
            diagnostics,
        }
    }
}

/// The cut with the highest silhouette among `range`; a single cluster when the range is empty.
pub(crate) fn best_cut(
    tree: &Dendrogram,
    distances: &DistanceMatrix,
    range: std::ops::RangeInclusive<usize>,
) -> Vec<usize> {
    let mut best: Option<(f64, Vec<usize>)> = None;
    for k in range {
        let labels = tree.labels_for_k(k);
        let score = silhouette(distances, &labels, k);
        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, labels));
        }
    }
    best.map(|(_, labels)| labels)
        .unwrap_or_else(|| tree.labels_for_k(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for (cx, cy) in [(1500.0, 10.0), (1900.0, 40.0), (2300.0, 10.0)] {
            for i in 0..8 {
                let offset = (i as f64 - 3.5) * 3.0;
                data.push(vec![cx + offset, cy + offset * 0.1]);
            }
        }
        data
    }

    fn analyzer(options: ClusteringOptions) -> ClusteringAnalyzer {
        ClusteringAnalyzer::new(options).unwrap()
    }

    fn assert_blocks(labels: &[usize]) {
        for block in labels.chunks(8) {
            assert!(block.iter().all(|l| *l == block[0]));
        }
        assert_eq!(labels[0], 0);
    }

    #[test]
    fn test_kmeans_chooses_k_automatically() {
        let result = analyzer(ClusteringOptions {
            seed: Some(7),
            ..Default::default()
        })
        .cluster(&blobs())
        .unwrap();
        assert_eq!(result.k, 3);
        assert_blocks(&result.labels);
        assert!(result.validation_score > 0.8);
        // Centroids are reported in the original units.
        assert!((result.centroids[0][0] - 1500.0).abs() < 1.0);
    }

    #[test]
    fn test_every_algorithm_labels_in_range() {
        for algorithm in [
            ClusteringAlgorithm::KMeans,
            ClusteringAlgorithm::Hierarchical,
            ClusteringAlgorithm::Density,
            ClusteringAlgorithm::Distribution,
        ] {
            let result = analyzer(ClusteringOptions {
                algorithm,
                seed: Some(3),
                ..Default::default()
            })
            .cluster(&blobs())
            .unwrap();
            assert_eq!(result.labels.len(), 24);
            assert!(result.labels.iter().all(|l| *l < result.k), "{:?}", algorithm);
            assert_eq!(result.centroids.len(), result.k);
        }
    }

    #[test]
    fn test_hierarchical_with_fixed_k() {
        let result = analyzer(ClusteringOptions {
            algorithm: ClusteringAlgorithm::Hierarchical,
            k: Some(3),
            ..Default::default()
        })
        .cluster(&blobs())
        .unwrap();
        assert_eq!(result.k, 3);
        assert_blocks(&result.labels);
    }

    #[test]
    fn test_distribution_probabilities_match_k() {
        let result = analyzer(ClusteringOptions {
            algorithm: ClusteringAlgorithm::Distribution,
            k: Some(3),
            seed: Some(11),
            ..Default::default()
        })
        .cluster(&blobs())
        .unwrap();
        let probabilities = result.probabilities.unwrap();
        assert!(probabilities.iter().all(|row| row.len() == result.k));
        assert!(probabilities
            .iter()
            .all(|row| (row.iter().sum::<f64>() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_k_larger_than_observations_is_rejected() {
        let result = analyzer(ClusteringOptions {
            k: Some(30),
            ..Default::default()
        })
        .cluster(&blobs());
        assert!(matches!(result, Err(AnalyticsError::Configuration(_))));
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let options = ClusteringOptions {
            seed: Some(99),
            k: Some(3),
            ..Default::default()
        };
        let a = analyzer(options.clone()).cluster(&blobs()).unwrap();
        let b = analyzer(options).cluster(&blobs()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ragged_features_are_rejected() {
        let features = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            analyzer(ClusteringOptions::default()).cluster(&features),
            Err(AnalyticsError::Validation(_))
        ));
    }
}
