use crate::clustering::validation::DistanceMatrix;

/// Smallest mean reachability distance, so duplicated points keep a finite density.
const MIN_REACH: f64 = 1e-12;

/// Local outlier factor mapped to `[0, 1)` as `max(0, (lof - 1) / lof)`.
///
/// Neighbourhoods include every point tied with the k-th nearest one.
pub(crate) fn scores(rows: &[Vec<f64>], n_neighbors: usize) -> Vec<f64> {
    let m = rows.len();
    if m < 2 {
        return vec![0.0; m];
    }
    let k = n_neighbors.clamp(1, m - 1);
    let distances = DistanceMatrix::euclidean(rows);

    let mut k_distance = vec![0.0; m];
    let mut neighbourhoods: Vec<Vec<usize>> = Vec::with_capacity(m);
    for i in 0..m {
        let sorted = distances.neighbours(i);
        let radius = sorted[k - 1].1;
        k_distance[i] = radius;
        neighbourhoods.push(sorted.iter().take_while(|(_, d)| *d <= radius).map(|(j, _)| *j).collect());
    }

    let density: Vec<f64> = (0..m)
        .map(|i| {
            let reach: f64 = neighbourhoods[i]
                .iter()
                .map(|&j| k_distance[j].max(distances.get(i, j)))
                .sum::<f64>()
                / neighbourhoods[i].len() as f64;
            1.0 / reach.max(MIN_REACH)
        })
        .collect();

    (0..m)
        .map(|i| {
            let neighbour_density: f64 = neighbourhoods[i].iter().map(|&j| density[j]).sum::<f64>()
                / neighbourhoods[i].len() as f64;
            let lof = neighbour_density / density[i];
            if lof.is_finite() && lof > 1.0 { (lof - 1.0) / lof } else { 0.0 }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_far_point_has_high_factor() {
        let mut rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64 * 0.5]).collect();
        rows.push(vec![100.0]);
        let s = scores(&rows, 5);
        assert!(s[20] > 0.9);
        assert!(s[5] < 0.2);
    }

    #[test]
    fn test_uniform_grid_scores_low() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64]).collect();
        assert!(scores(&rows, 4).iter().all(|v| *v < 0.5));
    }

    #[test]
    fn test_duplicates_do_not_explode() {
        let rows = vec![vec![1500.0]; 15];
        assert!(scores(&rows, 5).iter().all(|v| *v == 0.0));
    }
}
