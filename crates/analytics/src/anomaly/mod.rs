//! Point, contextual and collective anomaly detection.

mod context;
mod isolation;
mod lof;
mod statistical;

use crate::error::AnalyticsError;
use crate::stats;
use configuration::AnomalyOptions;
use core_types::{validate, validate_features, AnomalyMethod, AnomalyRecord, Severity, TimeSeries};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fewest observations the detector accepts.
pub const MIN_OBSERVATIONS: usize = 10;

/// What the detector runs on: a single series, or one feature vector per observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyInput {
    Series(TimeSeries),
    Features(Vec<Vec<f64>>),
}

impl AnomalyInput {
    pub fn len(&self) -> usize {
        match self {
            AnomalyInput::Series(s) => s.len(),
            AnomalyInput::Features(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    options: AnomalyOptions,
}

impl AnomalyDetector {
    pub fn new(options: AnomalyOptions) -> Result<Self, AnalyticsError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &AnomalyOptions {
        &self.options
    }

    /// The point-scoring methods that will run.
    pub fn active_methods(&self) -> Vec<AnomalyMethod> {
        match self.options.method {
            AnomalyMethod::Ensemble => {
                let mut methods: Vec<AnomalyMethod> = Vec::new();
                for m in &self.options.ensemble_methods {
                    if *m != AnomalyMethod::Ensemble && !methods.contains(m) {
                        methods.push(*m);
                    }
                }
                methods
            }
            single => vec![single],
        }
    }

    /// Whether repeated calls on the same input give the same records.
    pub fn is_deterministic(&self) -> bool {
        self.options.seed.is_some() || !self.active_methods().contains(&AnomalyMethod::IsolationForest)
    }

    /// Flagged observations sorted by index. An empty list is a valid result.
    pub fn detect(&self, input: &AnomalyInput) -> Result<Vec<AnomalyRecord>, AnalyticsError> {
        let opts = &self.options;
        let (rows, series) = match input {
            AnomalyInput::Series(s) => {
                validate(s, MIN_OBSERVATIONS)?;
                (s.values.iter().map(|v| vec![*v]).collect::<Vec<_>>(), Some(&s.values))
            }
            AnomalyInput::Features(rows) => {
                validate_features(rows, MIN_OBSERVATIONS)?;
                (rows.clone(), None)
            }
        };
        let methods = self.active_methods();
        if methods.is_empty() {
            return Err(AnalyticsError::invalid_options(
                "ensemble detection needs at least one point method",
            ));
        }

        let mut rng = match opts.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let m = rows.len();
        let mut combined = vec![0.0; m];
        for method in &methods {
            let scores = match method {
                AnomalyMethod::Statistical => statistical::scores(&rows, opts.z_threshold),
                AnomalyMethod::IsolationForest => {
                    isolation::scores(&rows, opts.n_trees, opts.sample_size, &mut rng)
                }
                AnomalyMethod::LocalOutlierFactor => lof::scores(&rows, opts.n_neighbors),
                AnomalyMethod::Ensemble => continue,
            };
            for (c, s) in combined.iter_mut().zip(scores) {
                *c += s / methods.len() as f64;
            }
        }

        let threshold = stats::quantile_sorted(&stats::sorted(&combined), 1.0 - opts.contamination)
            .max(opts.min_score);
        let point: Vec<bool> = combined.iter().map(|s| *s > threshold).collect();
        let contextual = match series {
            Some(values) if opts.contextual => context::contextual(values, opts.context_window, opts.z_threshold),
            _ => vec![false; m],
        };
        let collective = match series {
            Some(values) if opts.collective => {
                context::collective(values, opts.min_collective_length, opts.collective_threshold)
            }
            _ => vec![false; m],
        };

        let records: Vec<AnomalyRecord> = (0..m)
            .filter(|&i| point[i] || contextual[i] || collective[i])
            .map(|i| AnomalyRecord {
                index: i,
                score: combined[i],
                severity: Severity::from_score(combined[i]),
                method: opts.method,
                is_contextual: contextual[i],
                is_collective: collective[i],
            })
            .collect();

        debug!(
            observations = m,
            threshold,
            flagged = records.len(),
            methods = ?methods,
            "anomaly detection finished"
        );
        Ok(records)
    }
}
