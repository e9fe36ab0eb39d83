//! Lloyd's k-means with k-means++ seeding and restarts.

use crate::stats;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub(crate) struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// Best of `n_init` seeded runs, by inertia.
pub(crate) fn fit(
    data: &[Vec<f64>],
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    n_init: usize,
    rng: &mut ChaCha8Rng,
) -> KMeansFit {
    let mut best: Option<KMeansFit> = None;
    for _ in 0..n_init.max(1) {
        let centroids = plus_plus(data, k, rng);
        let run = lloyd(data, centroids, max_iterations, tolerance);
        if best.as_ref().is_none_or(|b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best.unwrap_or_else(|| KMeansFit {
        labels: vec![0; data.len()],
        centroids: vec![stats::centroid(data, 0..data.len())],
        inertia: 0.0,
        converged: true,
        iterations: 0,
    })
}

/// k-means++: each new centre is drawn with probability proportional to the
/// squared distance to the nearest centre already chosen.
fn plus_plus(data: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.gen_range(0..n)].clone());

    let mut nearest: Vec<f64> = data
        .iter()
        .map(|p| stats::squared_distance(p, &centroids[0]))
        .collect();
    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let index = if total > 0.0 {
            let mut target = rng.r#gen::<f64>() * total;
            let mut chosen = n - 1;
            for (i, d) in nearest.iter().enumerate() {
                target -= d;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.gen_range(0..n)
        };
        let centre = data[index].clone();
        for (slot, p) in nearest.iter_mut().zip(data) {
            *slot = slot.min(stats::squared_distance(p, &centre));
        }
        centroids.push(centre);
    }
    centroids
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(c, centre)| (c, stats::squared_distance(point, centre)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

fn lloyd(data: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, max_iterations: usize, tolerance: f64) -> KMeansFit {
    let k = centroids.len();
    let mut labels = vec![0usize; data.len()];
    let mut converged = false;
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        for (label, point) in labels.iter_mut().zip(data) {
            *label = nearest_centroid(point, &centroids).0;
        }

        let mut updated: Vec<Vec<f64>> = (0..k)
            .map(|c| stats::centroid(data, (0..data.len()).filter(|&i| labels[i] == c)))
            .collect();
        for c in 0..k {
            if labels.iter().any(|&l| l == c) {
                continue;
            }
            // Empty cluster: move it to the point worst served by its centre.
            let farthest = (0..data.len())
                .max_by(|&a, &b| {
                    let da = stats::squared_distance(&data[a], &centroids[labels[a]]);
                    let db = stats::squared_distance(&data[b], &centroids[labels[b]]);
                    da.total_cmp(&db).then(b.cmp(&a))
                })
                .unwrap_or(0);
            labels[farthest] = c;
            updated[c] = data[farthest].clone();
        }

        let shift = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| stats::euclidean(a, b))
            .fold(0.0_f64, f64::max);
        centroids = updated;
        if shift < tolerance {
            converged = true;
            break;
        }
    }

    for (label, point) in labels.iter_mut().zip(data) {
        *label = nearest_centroid(point, &centroids).0;
    }
    let inertia = labels
        .iter()
        .zip(data)
        .map(|(&l, p)| stats::squared_distance(p, &centroids[l]))
        .sum();
    KMeansFit {
        labels,
        centroids,
        inertia,
        converged,
        iterations,
    }
}
