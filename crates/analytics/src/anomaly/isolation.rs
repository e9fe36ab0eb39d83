//! Isolation forest.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        dim: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

struct Tree {
    nodes: Vec<Node>,
}

/// Average path length of an unsuccessful binary-search-tree lookup among `n` points.
fn average_path(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Uniform split in `(lo, hi]`, computed on halves so spans wider than
/// `f64::MAX` stay finite.
fn split_point(lo: f64, hi: f64, rng: &mut ChaCha8Rng) -> f64 {
    let t: f64 = rng.r#gen();
    let value = lo + t * (hi / 2.0 - lo / 2.0) * 2.0;
    if value > lo && value <= hi {
        return value;
    }
    let mid = lo / 2.0 + hi / 2.0;
    if mid > lo { mid } else { hi }
}

impl Tree {
    fn grow(rows: &[Vec<f64>], sample: Vec<usize>, height_limit: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut tree = Tree { nodes: Vec::new() };
        tree.build(rows, sample, 0, height_limit, rng);
        tree
    }

    fn build(
        &mut self,
        rows: &[Vec<f64>],
        members: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: members.len() });
        if depth >= height_limit || members.len() <= 1 {
            return id;
        }

        let dim = rows[members[0]].len();
        let spans: Vec<(usize, f64, f64)> = (0..dim)
            .filter_map(|d| {
                let (lo, hi) = members.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(rows[i][d]), hi.max(rows[i][d]))
                });
                (hi > lo).then_some((d, lo, hi))
            })
            .collect();
        if spans.is_empty() {
            return id;
        }
        let (d, lo, hi) = spans[rng.gen_range(0..spans.len())];
        let value = split_point(lo, hi, rng);
        let (left_members, right_members): (Vec<usize>, Vec<usize>) =
            members.into_iter().partition(|&i| rows[i][d] < value);

        let left = self.build(rows, left_members, depth + 1, height_limit, rng);
        let right = self.build(rows, right_members, depth + 1, height_limit, rng);
        self.nodes[id] = Node::Split {
            dim: d,
            value,
            left,
            right,
        };
        id
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path(*size),
                Node::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    node = if point[*dim] < *value { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Anomaly score `2^(-E[h] / c(psi))` for every row; about 0.5 for typical
/// points and approaching 1 for easily isolated ones.
pub(crate) fn scores(rows: &[Vec<f64>], n_trees: usize, sample_size: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
    let m = rows.len();
    let psi = sample_size.min(m).max(1);
    let height_limit = (psi as f64).log2().ceil() as usize;
    let forest: Vec<Tree> = (0..n_trees.max(1))
        .map(|_| {
            let sample = rand::seq::index::sample(rng, m, psi).into_vec();
            Tree::grow(rows, sample, height_limit, rng)
        })
        .collect();

    let normaliser = average_path(psi);
    rows.iter()
        .map(|row| {
            if normaliser <= 0.0 {
                return 0.5;
            }
            let mean_path = forest.iter().map(|t| t.path_length(row)).sum::<f64>() / forest.len() as f64;
            2f64.powf(-mean_path / normaliser)
        })
        .collect()
}
