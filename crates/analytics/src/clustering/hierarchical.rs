//! Agglomerative clustering with Lance-Williams distance updates.

use super::validation::{canonicalize, DistanceMatrix};
use core_types::Linkage;

#[derive(Debug, Clone, Copy)]
struct Merge {
    into: usize,
    from: usize,
    height: f64,
}

/// The full merge history of an agglomerative run over `n` points.
#[derive(Debug, Clone)]
pub(crate) struct Dendrogram {
    n: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Merges the closest pair of active clusters until one remains.
    ///
    /// Ward linkage works on squared distances internally; reported heights are
    /// always in distance units.
    pub fn build(distances: &DistanceMatrix, linkage: Linkage) -> Self {
        let n = distances.len();
        let squared = linkage == Linkage::Ward;
        let mut d: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let v = distances.get(i, j);
                        if squared { v * v } else { v }
                    })
                    .collect()
            })
            .collect();
        let mut size = vec![1usize; n];
        let mut active = vec![true; n];
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        for _ in 1..n {
            let mut best = (usize::MAX, usize::MAX, f64::INFINITY);
            for i in 0..n {
                if !active[i] {
                    continue;
                }
                for j in i + 1..n {
                    if active[j] && d[i][j] < best.2 {
                        best = (i, j, d[i][j]);
                    }
                }
            }
            let (i, j, dij) = best;
            if i == usize::MAX {
                break;
            }

            for k in 0..n {
                if !active[k] || k == i || k == j {
                    continue;
                }
                let (ni, nj, nk) = (size[i] as f64, size[j] as f64, size[k] as f64);
                let updated = match linkage {
                    Linkage::Single => d[i][k].min(d[j][k]),
                    Linkage::Complete => d[i][k].max(d[j][k]),
                    Linkage::Average => (ni * d[i][k] + nj * d[j][k]) / (ni + nj),
                    Linkage::Ward => {
                        ((ni + nk) * d[i][k] + (nj + nk) * d[j][k] - nk * dij) / (ni + nj + nk)
                    }
                };
                d[i][k] = updated;
                d[k][i] = updated;
            }
            size[i] += size[j];
            active[j] = false;
            merges.push(Merge {
                into: i,
                from: j,
                height: if squared { dij.max(0.0).sqrt() } else { dij },
            });
        }
        Self { n, merges }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    /// Cuts the tree into exactly `k` clusters (clamped to `[1, n]`).
    pub fn labels_for_k(&self, k: usize) -> Vec<usize> {
        let k = k.clamp(1, self.n.max(1));
        self.replay(self.n.saturating_sub(k))
    }

    /// Cuts the tree at `height`: merges above it are not applied.
    pub fn labels_for_height(&self, height: f64) -> Vec<usize> {
        let count = self.merges.iter().take_while(|m| m.height <= height).count();
        self.replay(count)
    }

    fn replay(&self, count: usize) -> Vec<usize> {
        let mut parent: Vec<usize> = (0..self.n).collect();
        fn root(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for merge in self.merges.iter().take(count) {
            let a = root(&mut parent, merge.into);
            let b = root(&mut parent, merge.from);
            parent[b] = a;
        }
        let roots: Vec<usize> = (0..self.n).map(|i| root(&mut parent, i)).collect();
        canonicalize(&roots).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> DistanceMatrix {
        // Points at 0, 1, 2 and 10, 11.
        let xs = [0.0, 1.0, 2.0, 10.0, 11.0];
        DistanceMatrix::euclidean(&xs.iter().map(|x| vec![*x]).collect::<Vec<_>>())
    }

    #[test]
    fn test_cut_by_k() {
        for linkage in [Linkage::Single, Linkage::Complete, Linkage::Average, Linkage::Ward] {
            let tree = Dendrogram::build(&line(), linkage);
            assert_eq!(tree.labels_for_k(2), vec![0, 0, 0, 1, 1]);
            assert_eq!(tree.labels_for_k(1), vec![0; 5]);
            assert_eq!(tree.labels_for_k(5), vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_cut_by_height() {
        let tree = Dendrogram::build(&line(), Linkage::Single);
        assert_eq!(tree.labels_for_height(1.5), vec![0, 0, 0, 1, 1]);
        assert_eq!(tree.labels_for_height(0.5), vec![0, 1, 2, 3, 4]);
        assert_eq!(tree.labels_for_height(100.0), vec![0; 5]);
    }

    #[test]
    fn test_heights_are_monotone() {
        let tree = Dendrogram::build(&line(), Linkage::Average);
        assert!(tree.merges.windows(2).all(|w| w[0].height <= w[1].height + 1e-12));
    }
}
