//! Bounded Nelder-Mead simplex minimiser.

#[derive(Debug, Clone)]
pub(crate) struct Bounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Bounds {
    fn clamp(&self, point: &mut [f64]) {
        for (i, v) in point.iter_mut().enumerate() {
            *v = v.clamp(self.lower[i], self.upper[i]);
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimises `f` inside `bounds`, starting from `initial`.
///
/// Convergence is declared when the simplex diameter drops below `tol`. When the
/// iteration budget runs out first, the best vertex is returned with
/// `converged == false`.
pub(crate) fn nelder_mead<F>(
    f: F,
    initial: &[f64],
    bounds: &Bounds,
    max_iter: usize,
    tol: f64,
) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let dim = initial.len();
    let n = dim + 1;
    let eval = |p: &[f64]| {
        let v = f(p);
        if v.is_finite() { v } else { f64::MAX }
    };

    let mut start = initial.to_vec();
    bounds.clamp(&mut start);
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n);
    simplex.push(start.clone());
    for i in 0..dim {
        let mut vertex = start.clone();
        let step = (bounds.upper[i] - bounds.lower[i]) * 0.1;
        vertex[i] = (vertex[i] + step).min(bounds.upper[i]);
        if (vertex[i] - start[i]).abs() < 1e-12 {
            vertex[i] = (vertex[i] - step).max(bounds.lower[i]);
        }
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iter {
        iterations += 1;
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

        let best = order[0];
        let worst = order[n - 1];
        let second_worst = order[n - 2];

        let diameter = simplex
            .iter()
            .map(|v| {
                v.iter()
                    .zip(&simplex[best])
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0_f64, f64::max)
            })
            .fold(0.0_f64, f64::max);
        if diameter < tol {
            converged = true;
            break;
        }

        let mut centroid = vec![0.0; dim];
        for &idx in &order[..n - 1] {
            for (c, v) in centroid.iter_mut().zip(&simplex[idx]) {
                *c += v;
            }
        }
        for c in centroid.iter_mut() {
            *c /= (n - 1) as f64;
        }

        let mut reflected: Vec<f64> = centroid
            .iter()
            .zip(&simplex[worst])
            .map(|(c, w)| 2.0 * c - w)
            .collect();
        bounds.clamp(&mut reflected);
        let f_reflected = eval(&reflected);

        if f_reflected < values[best] {
            let mut expanded: Vec<f64> = centroid
                .iter()
                .zip(&reflected)
                .map(|(c, r)| 2.0 * r - c)
                .collect();
            bounds.clamp(&mut expanded);
            let f_expanded = eval(&expanded);
            if f_expanded < f_reflected {
                simplex[worst] = expanded;
                values[worst] = f_expanded;
            } else {
                simplex[worst] = reflected;
                values[worst] = f_reflected;
            }
        } else if f_reflected < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = f_reflected;
        } else {
            let (from, f_from) = if f_reflected < values[worst] {
                (reflected, f_reflected)
            } else {
                (simplex[worst].clone(), values[worst])
            };
            let mut contracted: Vec<f64> = centroid
                .iter()
                .zip(&from)
                .map(|(c, w)| 0.5 * (c + w))
                .collect();
            bounds.clamp(&mut contracted);
            let f_contracted = eval(&contracted);

            if f_contracted < f_from {
                simplex[worst] = contracted;
                values[worst] = f_contracted;
            } else {
                let anchor = simplex[best].clone();
                for &idx in &order[1..] {
                    for (v, a) in simplex[idx].iter_mut().zip(&anchor) {
                        *v = 0.5 * (*v + a);
                    }
                    bounds.clamp(&mut simplex[idx]);
                    values[idx] = eval(&simplex[idx]);
                }
            }
        }
    }

    let best = (0..n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);
    Minimum {
        point: simplex[best].clone(),
        value: values[best],
        iterations,
        converged,
    }
}
