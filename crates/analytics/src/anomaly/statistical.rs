use crate::stats::RobustScale;

/// Robust z-score detector.
///
/// Each column is centred on its median and scaled by MAD (IQR, then standard
/// deviation, as fallbacks). A row's score is `z / (z + z_threshold)` for its
/// largest absolute z, so `z_threshold` maps to 0.5.
pub(crate) fn scores(rows: &[Vec<f64>], z_threshold: f64) -> Vec<f64> {
    let dim = rows.first().map(|r| r.len()).unwrap_or(0);
    let scales: Vec<RobustScale> = (0..dim)
        .map(|d| RobustScale::of(&rows.iter().map(|r| r[d]).collect::<Vec<_>>()))
        .collect();
    rows.iter()
        .map(|row| {
            let z = row
                .iter()
                .zip(&scales)
                .map(|(v, s)| s.z(*v).abs())
                .fold(0.0, f64::max);
            z / (z + z_threshold)
        })
        .collect()
}
