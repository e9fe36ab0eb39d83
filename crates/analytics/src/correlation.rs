use crate::clustering::hierarchical::Dendrogram;
use crate::clustering::validation::{silhouette, DistanceMatrix};
use crate::clustering::best_cut;
use crate::error::AnalyticsError;
use crate::stats;
use configuration::CorrelationOptions;
use core_types::{
    validate_aligned, validate_variation, CorrelatedPair, CorrelationAnalysisType, CorrelationKind,
    CorrelationMatrix, CorrelationMethod, Diagnostic, FactorGroups, Linkage, NetworkSummary,
    TimeSeries, ValidationError,
};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use tracing::{debug, warn};

/// Shortest series the analyzer accepts.
pub const MIN_LENGTH: usize = 10;

/// Pivots smaller than this make the correlation matrix count as singular.
const PIVOT_THRESHOLD: f64 = 1e-10;

/// `1 - r^2` at or below this is treated as a perfect correlation.
const PERFECT_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    options: CorrelationOptions,
}

impl CorrelationAnalyzer {
    pub fn new(options: CorrelationOptions) -> Result<Self, AnalyticsError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &CorrelationOptions {
        &self.options
    }

    pub fn analyze(&self, series: &[TimeSeries]) -> Result<CorrelationMatrix, AnalyticsError> {
        let opts = &self.options;
        if series.len() < 2 {
            return Err(ValidationError::DimensionMismatch(format!(
                "correlation needs at least two series, got {}",
                series.len()
            ))
            .into());
        }
        if !opts.labels.is_empty() && opts.labels.len() != series.len() {
            return Err(AnalyticsError::invalid_options(format!(
                "{} labels given for {} series",
                opts.labels.len(),
                series.len()
            )));
        }
        let n = validate_aligned(series, MIN_LENGTH)?;
        for s in series {
            validate_variation(s)?;
        }

        let columns: Vec<Vec<f64>> = match opts.method {
            CorrelationMethod::Spearman => series.iter().map(|s| stats::ranks(&s.values)).collect(),
            _ => series.iter().map(|s| s.values.clone()).collect(),
        };
        let size = columns.len();
        let mut matrix = identity(size);
        let mut p_values = vec![vec![0.0; size]; size];
        for i in 0..size {
            for j in i + 1..size {
                let (r, p) = match opts.method {
                    CorrelationMethod::Kendall => {
                        let tau = kendall_tau_b(&columns[i], &columns[j]);
                        (tau, kendall_p_value(tau, n)?)
                    }
                    _ => {
                        let r = pearson(&columns[i], &columns[j]);
                        (r, t_p_value(r, n as f64 - 2.0)?)
                    }
                };
                set_symmetric(&mut matrix, i, j, r);
                set_symmetric(&mut p_values, i, j, p);
            }
        }

        let mut diagnostics = Vec::new();
        let mut kind = CorrelationKind::Pairwise;
        if opts.analysis_type == CorrelationAnalysisType::Partial {
            match partial_correlations(&matrix, n)? {
                Some((partial, partial_p)) => {
                    matrix = partial;
                    p_values = partial_p;
                    kind = CorrelationKind::Partial;
                }
                None => {
                    warn!(size, "correlation matrix is near-singular; returning pairwise correlations");
                    diagnostics.push(Diagnostic::fallback(
                        "partial",
                        "pairwise",
                        "correlation matrix is near-singular",
                    ));
                }
            }
        }

        let network = (opts.analysis_type == CorrelationAnalysisType::Network)
            .then(|| self.network(&matrix, &p_values));
        let factor_groups = (opts.analysis_type == CorrelationAnalysisType::HierarchicalFactor)
            .then(|| self.factor_groups(&matrix));

        debug!(series = size, observations = n, method = ?opts.method, "correlations computed");
        Ok(CorrelationMatrix {
            method: opts.method,
            kind,
            labels: opts.labels.clone(),
            matrix,
            p_values,
            observations: n,
            network,
            factor_groups,
            diagnostics,
        })
    }

    fn network(&self, matrix: &[Vec<f64>], p_values: &[Vec<f64>]) -> NetworkSummary {
        let size = matrix.len();
        let mut edges = Vec::new();
        for i in 0..size {
            for j in i + 1..size {
                let r = matrix[i][j];
                if r.abs() >= self.options.min_correlation && p_values[i][j] < self.options.significance {
                    edges.push(CorrelatedPair {
                        a: i,
                        b: j,
                        correlation: r,
                        p_value: p_values[i][j],
                    });
                }
            }
        }

        let mut degrees = vec![0usize; size];
        let mut parent: Vec<usize> = (0..size).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for edge in &edges {
            degrees[edge.a] += 1;
            degrees[edge.b] += 1;
            let (ra, rb) = (find(&mut parent, edge.a), find(&mut parent, edge.b));
            if ra != rb {
                parent[rb] = ra;
            }
        }
        let components = (0..size).filter(|&i| find(&mut parent, i) == i).count();
        let possible = size * (size - 1) / 2;
        let density = if possible > 0 { edges.len() as f64 / possible as f64 } else { 0.0 };

        let edge_count = edges.len();
        edges.sort_by(|x, y| {
            y.correlation
                .abs()
                .total_cmp(&x.correlation.abs())
                .then(x.a.cmp(&y.a))
                .then(x.b.cmp(&y.b))
        });
        edges.truncate(self.options.max_pairs);
        NetworkSummary {
            threshold: self.options.min_correlation,
            edge_count,
            density,
            degrees,
            components,
            strong_pairs: edges,
        }
    }

    /// Groups variables by average-linkage clustering on `1 - |r|`.
    fn factor_groups(&self, matrix: &[Vec<f64>]) -> FactorGroups {
        let size = matrix.len();
        let distances = DistanceMatrix::from_square(
            matrix
                .iter()
                .map(|row| row.iter().map(|r| 1.0 - r.abs()).collect())
                .collect(),
        );
        let tree = Dendrogram::build(&distances, Linkage::Average);
        let labels = match self.options.factor_groups {
            Some(k) => tree.labels_for_k(k.min(size)),
            None if size >= 3 => best_cut(&tree, &distances, 2..=size - 1),
            None => vec![0; size],
        };
        let k = labels.iter().copied().max().map_or(1, |m| m + 1);
        FactorGroups {
            k,
            validation_score: silhouette(&distances, &labels, k),
            labels,
        }
    }
}

fn identity(size: usize) -> Vec<Vec<f64>> {
    (0..size)
        .map(|i| (0..size).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

fn set_symmetric(matrix: &mut [Vec<f64>], i: usize, j: usize, value: f64) {
    matrix[i][j] = value;
    matrix[j][i] = value;
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let (mx, my) = (stats::mean(x), stats::mean(y));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    let denom = (sxx * syy).sqrt();
    if denom > 0.0 { (sxy / denom).clamp(-1.0, 1.0) } else { 0.0 }
}

/// Kendall's tau-b, which corrects for ties in either variable.
fn kendall_tau_b(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    let (mut concordant, mut discordant) = (0i64, 0i64);
    let (mut ties_x, mut ties_y) = (0i64, 0i64);
    for i in 0..n {
        for j in i + 1..n {
            let dx = x[j].partial_cmp(&x[i]).map_or(0, |o| o as i8);
            let dy = y[j].partial_cmp(&y[i]).map_or(0, |o| o as i8);
            if dx == 0 {
                ties_x += 1;
            }
            if dy == 0 {
                ties_y += 1;
            }
            match dx * dy {
                1 => concordant += 1,
                -1 => discordant += 1,
                _ => {}
            }
        }
    }
    let pairs = (n * (n - 1) / 2) as i64;
    let denom = (((pairs - ties_x) * (pairs - ties_y)) as f64).sqrt();
    if denom > 0.0 {
        ((concordant - discordant) as f64 / denom).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Two-sided p-value of a correlation coefficient via Student's t.
fn t_p_value(r: f64, df: f64) -> Result<f64, AnalyticsError> {
    if df < 1.0 {
        return Ok(1.0);
    }
    let residual = 1.0 - r * r;
    if residual <= PERFECT_TOLERANCE {
        return Ok(0.0);
    }
    let t = r * (df / residual).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| AnalyticsError::Calculation(e.to_string()))?;
    Ok((2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0))
}

/// Two-sided p-value of Kendall's tau from its normal approximation.
fn kendall_p_value(tau: f64, n: usize) -> Result<f64, AnalyticsError> {
    let n = n as f64;
    let z = 3.0 * tau * (n * (n - 1.0)).sqrt() / (2.0 * (2.0 * n + 5.0)).sqrt();
    let standard = Normal::new(0.0, 1.0).map_err(|e| AnalyticsError::Calculation(e.to_string()))?;
    Ok((2.0 * (1.0 - standard.cdf(z.abs()))).clamp(0.0, 1.0))
}

/// Gauss-Jordan inversion with partial pivoting. `None` when a pivot is too small.
fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let size = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inverse = identity(size);
    for col in 0..size {
        let pivot = (col..size).max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))?;
        if a[pivot][col].abs() < PIVOT_THRESHOLD {
            return None;
        }
        a.swap(col, pivot);
        inverse.swap(col, pivot);
        let scale = a[col][col];
        for v in a[col].iter_mut() {
            *v /= scale;
        }
        for v in inverse[col].iter_mut() {
            *v /= scale;
        }
        for row in 0..size {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..size {
                a[row][k] -= factor * a[col][k];
                inverse[row][k] -= factor * inverse[col][k];
            }
        }
    }
    Some(inverse)
}

type PartialResult = Option<(Vec<Vec<f64>>, Vec<Vec<f64>>)>;

/// Partial correlations of every pair given all other variables, with p-values
/// on `n - N` degrees of freedom.
fn partial_correlations(matrix: &[Vec<f64>], n: usize) -> Result<PartialResult, AnalyticsError> {
    let size = matrix.len();
    let Some(precision) = invert(matrix) else {
        return Ok(None);
    };
    if precision.iter().enumerate().any(|(i, row)| row[i] <= 0.0) {
        return Ok(None);
    }
    let df = n as f64 - size as f64;
    let mut partial = identity(size);
    let mut p_values = vec![vec![0.0; size]; size];
    for i in 0..size {
        for j in i + 1..size {
            let r = (-precision[i][j] / (precision[i][i] * precision[j][j]).sqrt()).clamp(-1.0, 1.0);
            set_symmetric(&mut partial, i, j, r);
            set_symmetric(&mut p_values, i, j, t_p_value(r, df)?);
        }
    }
    Ok(Some((partial, p_values)))
}
