//! Non-negative least squares by the classical Lawson-Hanson active-set
//! algorithm: `min ||A w - b||_2` subject to `w >= 0`.

use ndarray::{Array1, Array2};

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn unconstrained_solution_is_recovered() {
        // Well-conditioned system whose least-squares solution is positive.
        let a = array![[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]];
        let b = array![1.0, 4.0, 3.0];
        let (w, residual) = nnls(&a, &b);
        assert!(w.iter().all(|&x| x >= 0.0));
        assert!(residual < 1e-10);
        assert_relative_eq!(w[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(w[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn negative_component_is_clamped() {
        // The unconstrained fit of this system needs a negative weight;
        // NNLS must clamp it to zero instead.
        let a = array![[1.0, 1.0], [1.0, 1.0001]];
        let b = array![1.0, 0.5];
        let (w, _) = nnls(&a, &b);
        assert!(w.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn zero_rhs_gives_zero_solution() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![0.0, 0.0];
        let (w, residual) = nnls(&a, &b);
        assert!(w.iter().all(|&x| x == 0.0));
        assert!(residual < 1e-15);
    }

    #[test]
    fn wide_system() {
        // More unknowns than equations: some exact nonnegative fit exists.
        let a = array![[1.0, 0.5, 0.0, 0.25], [0.0, 0.5, 1.0, 0.25]];
        let b = array![1.0, 1.0];
        let (w, residual) = nnls(&a, &b);
        assert!(w.iter().all(|&x| x >= 0.0));
        assert!(residual < 1e-10);
        let fit = a.dot(&w);
        assert_relative_eq!(fit[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(fit[1], 1.0, epsilon = 1e-10);
    }
}

/// Solve `min ||A w - b||` with `w >= 0`. Returns the weights and the
/// Euclidean norm of the final residual.
pub fn nnls(a: &Array2<f64>, b: &Array1<f64>) -> (Array1<f64>, f64) {
    let (m, n) = a.dim();
    debug_assert_eq!(b.len(), m);

    let mut x = Array1::<f64>::zeros(n);
    let mut passive = vec![false; n];

    let max_outer = 3 * n.max(1);
    let mut outer = 0;

    loop {
        // Gradient of the residual: w = A^T (b - A x).
        let residual = b - &a.dot(&x);
        let gradient = a.t().dot(&residual);

        let tolerance = 10.0 * f64::EPSILON * gradient.iter().fold(0.0_f64, |acc, g| acc.max(g.abs()));

        let mut best: Option<(usize, f64)> = None;
        for j in 0..n {
            if passive[j] {
                continue;
            }
            if gradient[j] > tolerance && best.map_or(true, |(_, g)| gradient[j] > g) {
                best = Some((j, gradient[j]));
            }
        }
        let Some((j_enter, _)) = best else {
            break;
        };
        passive[j_enter] = true;
        outer += 1;
        if outer > max_outer {
            break;
        }

        // Inner loop: least squares on the passive set, stepping back when
        // a passive weight would turn negative.
        loop {
            let z = solve_passive(a, b, &passive);

            let feasible = passive
                .iter()
                .enumerate()
                .all(|(j, &p)| !p || z[j] > 0.0);
            if feasible {
                x = z;
                break;
            }

            let mut alpha = f64::MAX;
            for j in 0..n {
                if passive[j] && z[j] <= 0.0 {
                    let step = x[j] / (x[j] - z[j]);
                    if step < alpha {
                        alpha = step;
                    }
                }
            }
            for j in 0..n {
                if passive[j] {
                    x[j] += alpha * (z[j] - x[j]);
                    if x[j].abs() < 10.0 * f64::EPSILON {
                        x[j] = 0.0;
                        passive[j] = false;
                    }
                }
            }
        }
    }

    let rnorm = (b - &a.dot(&x)).mapv(|v| v * v).sum().sqrt();
    (x, rnorm)
}

/// Least-squares solution restricted to the passive columns, via the
/// normal equations with partial pivoting. Inactive entries are zero.
fn solve_passive(a: &Array2<f64>, b: &Array1<f64>, passive: &[bool]) -> Array1<f64> {
    let cols: Vec<usize> = (0..passive.len()).filter(|&j| passive[j]).collect();
    let k = cols.len();
    let n = passive.len();
    let mut z = Array1::<f64>::zeros(n);
    if k == 0 {
        return z;
    }

    // Normal matrix and right-hand side on the passive set.
    let mut normal = Array2::<f64>::zeros((k, k));
    let mut rhs = Array1::<f64>::zeros(k);
    for (r, &cr) in cols.iter().enumerate() {
        for (c, &cc) in cols.iter().enumerate() {
            let mut sum = 0.0;
            for i in 0..a.nrows() {
                sum += a[[i, cr]] * a[[i, cc]];
            }
            normal[[r, c]] = sum;
        }
        let mut sum = 0.0;
        for i in 0..a.nrows() {
            sum += a[[i, cr]] * b[i];
        }
        rhs[r] = sum;
    }

    // Gaussian elimination with partial pivoting; singular pivots get a
    // tiny ridge so the active-set loop can continue.
    for p in 0..k {
        let mut pivot = p;
        for r in p + 1..k {
            if normal[[r, p]].abs() > normal[[pivot, p]].abs() {
                pivot = r;
            }
        }
        if pivot != p {
            for c in 0..k {
                let tmp = normal[[p, c]];
                normal[[p, c]] = normal[[pivot, c]];
                normal[[pivot, c]] = tmp;
            }
            rhs.swap(p, pivot);
        }
        let mut diag = normal[[p, p]];
        if diag.abs() < f64::MIN_POSITIVE.sqrt() {
            diag += 1e-14;
            normal[[p, p]] = diag;
        }
        for r in p + 1..k {
            let factor = normal[[r, p]] / diag;
            if factor == 0.0 {
                continue;
            }
            for c in p..k {
                normal[[r, c]] -= factor * normal[[p, c]];
            }
            rhs[r] -= factor * rhs[p];
        }
    }
    let mut solution = Array1::<f64>::zeros(k);
    for p in (0..k).rev() {
        let mut sum = rhs[p];
        for c in p + 1..k {
            sum -= normal[[p, c]] * solution[c];
        }
        solution[p] = sum / normal[[p, p]];
    }

    for (r, &c) in cols.iter().enumerate() {
        z[c] = solution[r];
    }
    z
}
