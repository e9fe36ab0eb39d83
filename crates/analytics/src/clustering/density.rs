//! DBSCAN with an automatic neighbourhood radius.

use super::validation::DistanceMatrix;
use std::collections::VecDeque;

/// Radius used when every point sits on top of its neighbours.
const MIN_EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
pub(crate) struct DensityFit {
    /// Every point carries a cluster label; noise points get their nearest core's.
    pub labels: Vec<usize>,
    pub noise: Vec<bool>,
    pub clusters: usize,
    pub eps: f64,
}

/// Radius at the knee of the sorted k-distance curve: the point farthest from
/// the chord joining its first and last values.
pub(crate) fn estimate_eps(distances: &DistanceMatrix, k: usize) -> f64 {
    let n = distances.len();
    if n < 2 {
        return MIN_EPS;
    }
    let k = k.clamp(1, n - 1);
    let mut kdist: Vec<f64> = (0..n).map(|i| distances.neighbours(i)[k - 1].1).collect();
    kdist.sort_by(|a, b| a.total_cmp(b));

    let (first, last) = (kdist[0], kdist[n - 1]);
    if last - first <= f64::EPSILON {
        return first.max(MIN_EPS);
    }
    let knee = (0..n)
        .max_by(|&a, &b| {
            let gap = |i: usize| {
                let x = i as f64 / (n - 1) as f64;
                let y = (kdist[i] - first) / (last - first);
                x - y
            };
            gap(a).total_cmp(&gap(b)).then(b.cmp(&a))
        })
        .unwrap_or(n - 1);
    kdist[knee].max(MIN_EPS)
}

pub(crate) fn dbscan(distances: &DistanceMatrix, eps: Option<f64>, min_points: usize) -> DensityFit {
    let n = distances.len();
    let eps = eps.unwrap_or_else(|| estimate_eps(distances, min_points));
    let neighbourhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..n).filter(|&j| distances.get(i, j) <= eps).collect())
        .collect();
    let core: Vec<bool> = neighbourhoods.iter().map(|nb| nb.len() >= min_points).collect();

    let mut assigned: Vec<Option<usize>> = vec![None; n];
    let mut clusters = 0;
    for seed in 0..n {
        if !core[seed] || assigned[seed].is_some() {
            continue;
        }
        let id = clusters;
        clusters += 1;
        assigned[seed] = Some(id);
        let mut queue = VecDeque::from([seed]);
        while let Some(p) = queue.pop_front() {
            if !core[p] {
                continue;
            }
            for &q in &neighbourhoods[p] {
                if assigned[q].is_none() {
                    assigned[q] = Some(id);
                    queue.push_back(q);
                }
            }
        }
    }

    if clusters == 0 {
        return DensityFit {
            labels: vec![0; n],
            noise: vec![true; n],
            clusters: 1,
            eps,
        };
    }

    let noise: Vec<bool> = assigned.iter().map(|a| a.is_none()).collect();
    let labels = (0..n)
        .map(|i| match assigned[i] {
            Some(id) => id,
            None => (0..n)
                .filter(|&j| core[j])
                .min_by(|&a, &b| distances.get(i, a).total_cmp(&distances.get(i, b)))
                .and_then(|j| assigned[j])
                .unwrap_or(0),
        })
        .collect();
    DensityFit {
        labels,
        noise,
        clusters,
        eps,
    }
}
