//! Pairwise distances, silhouette scoring and label canonicalization.

use crate::stats;

/// Symmetric matrix of pairwise distances with a zero diagonal.
#[derive(Debug, Clone)]
pub(crate) struct DistanceMatrix {
    values: Vec<Vec<f64>>,
}

impl DistanceMatrix {
    /// Euclidean distances between rows.
    pub fn euclidean(rows: &[Vec<f64>]) -> Self {
        let n = rows.len();
        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i + 1..n {
                let d = stats::euclidean(&rows[i], &rows[j]);
                values[i][j] = d;
                values[j][i] = d;
            }
        }
        Self { values }
    }

    /// Wraps a precomputed square matrix, symmetrising it and zeroing the diagonal.
    pub fn from_square(mut values: Vec<Vec<f64>>) -> Self {
        let n = values.len();
        for i in 0..n {
            values[i][i] = 0.0;
            for j in i + 1..n {
                let d = 0.5 * (values[i][j] + values[j][i]);
                values[i][j] = d;
                values[j][i] = d;
            }
        }
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    /// Distances from `i` to every other point, nearest first.
    pub fn neighbours(&self, i: usize) -> Vec<(usize, f64)> {
        let mut out: Vec<(usize, f64)> = (0..self.len())
            .filter(|&j| j != i)
            .map(|j| (j, self.values[i][j]))
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        out
    }
}

/// Mean silhouette width over all points. Zero when fewer than two clusters
/// are present; points in singleton clusters contribute zero.
pub(crate) fn silhouette(distances: &DistanceMatrix, labels: &[usize], k: usize) -> f64 {
    let n = labels.len();
    if k < 2 || n < 2 {
        return 0.0;
    }
    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }
    if sizes.iter().filter(|s| **s > 0).count() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }
        let mut sums = vec![0.0; k];
        for j in 0..n {
            if j != i {
                sums[labels[j]] += distances.get(i, j);
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 && denom.is_finite() {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

/// Relabels clusters in order of first appearance and drops unused ids.
///
/// Returns the new labels, the number of clusters, and for each new label the
/// old label it came from.
pub(crate) fn canonicalize(labels: &[usize]) -> (Vec<usize>, usize, Vec<usize>) {
    let mut mapping: Vec<(usize, usize)> = Vec::new();
    let mut out = Vec::with_capacity(labels.len());
    for &old in labels {
        let new = match mapping.iter().find(|(o, _)| *o == old) {
            Some((_, n)) => *n,
            None => {
                mapping.push((old, mapping.len()));
                mapping.len() - 1
            }
        };
        out.push(new);
    }
    let origins = mapping.iter().map(|(o, _)| *o).collect();
    (out, mapping.len(), origins)
}
