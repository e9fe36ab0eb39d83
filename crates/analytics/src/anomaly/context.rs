//! Passes that look at a series' order: local context and contiguous runs.

use crate::stats::RobustScale;
use core_types::VARIANCE_EPSILON;

/// Points whose robust z against their `±window` neighbours (excluding
/// themselves) exceeds `z_threshold`.
///
/// A flat neighbourhood is measured against a relative floor instead, so a
/// jump out of a constant stretch is still flagged.
pub(crate) fn contextual(values: &[f64], window: usize, z_threshold: f64) -> Vec<bool> {
    let n = values.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(window);
            let hi = (i + window).min(n - 1);
            let neighbours: Vec<f64> = (lo..=hi).filter(|&j| j != i).map(|j| values[j]).collect();
            if neighbours.len() < 2 {
                return false;
            }
            let robust = RobustScale::of(&neighbours);
            let scale = if robust.scale > 0.0 {
                robust.scale
            } else {
                VARIANCE_EPSILON.sqrt() * (1.0 + robust.center.abs())
            };
            ((values[i] - robust.center) / scale).abs() > z_threshold
        })
        .collect()
}

/// Maximal same-sign runs of at least `min_length` points whose global robust
/// z exceeds `threshold` in magnitude.
pub(crate) fn collective(values: &[f64], min_length: usize, threshold: f64) -> Vec<bool> {
    let scale = RobustScale::of(values);
    let signs: Vec<i8> = values
        .iter()
        .map(|v| {
            let z = scale.z(*v);
            if z > threshold {
                1
            } else if z < -threshold {
                -1
            } else {
                0
            }
        })
        .collect();

    let mut flags = vec![false; values.len()];
    let mut start = 0;
    while start < signs.len() {
        let sign = signs[start];
        let mut end = start;
        while end + 1 < signs.len() && signs[end + 1] == sign {
            end += 1;
        }
        if sign != 0 && end - start + 1 >= min_length {
            flags[start..=end].iter_mut().for_each(|f| *f = true);
        }
        start = end + 1;
    }
    flags
}
