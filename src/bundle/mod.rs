//! Proximal bundle method (§4.6): the cutting-plane bundle, its
//! doubly-stabilized QP subproblem, the curve-search inner loop, and the
//! top-level solver.

pub mod curve_search;
pub mod solver;

use faer::Col;

use crate::E;

pub use curve_search::CurveSearch;
pub use solver::ProximalBundle;

/// A single cutting plane `h_j + g_j·(x − x̂)` anchored at the bundle's
/// current proximity center.
#[derive(Debug, Clone)]
struct Plane {
    g: Col<E>,
    h: E,
}

/// Solution of [`Bundle::solve`]: the primal point `x*`, the model value
/// `r*`, the plane multipliers `α`, the level-constraint multiplier `λ`, and
/// the proximity parameter `τ` actually used.
#[derive(Debug, Clone)]
pub struct BundleSolution {
    pub x: Col<E>,
    pub r: E,
    pub alpha: Vec<E>,
    pub lambda: E,
    pub tau: E,
}

fn dot(a: &Col<E>, b: &Col<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * b[i]).sum()
}

/// Cutting-plane bundle anchored at a proximity center `x̂`, holding at most
/// `capacity` planes (the last slot reserved for the aggregate plane during
/// compaction).
pub struct Bundle {
    planes: Vec<Plane>,
    x_hat: Col<E>,
    f_hat: E,
    capacity: usize,
}

impl Bundle {
    pub fn new(x0: Col<E>, f0: E, capacity: usize) -> Self {
        assert!(capacity >= 2, "bundle capacity must allow at least one plane plus the aggregate slot");
        Self {
            planes: Vec::with_capacity(capacity),
            x_hat: x0,
            f_hat: f0,
            capacity,
        }
    }

    pub fn center(&self) -> &Col<E> {
        &self.x_hat
    }

    pub fn center_value(&self) -> E {
        self.f_hat
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    /// Model value `max_j h_j + g_j·(x − x̂)`.
    pub fn fhat(&self, x: &Col<E>) -> E {
        self.planes
            .iter()
            .map(|p| p.h + dot(&p.g, &Col::from_fn(x.nrows(), |i| x[i] - self.x_hat[i])))
            .fold(E::NEG_INFINITY, E::max)
    }

    /// Serious step: shifts the proximity center to `y`, re-anchoring every
    /// stored plane, then appends the plane evaluated at `y`.
    pub fn moveto(&mut self, y: Col<E>, g_y: Col<E>, f_y: E) {
        let shift = Col::from_fn(y.nrows(), |i| y[i] - self.x_hat[i]);
        for plane in &mut self.planes {
            plane.h += dot(&plane.g, &shift);
        }
        self.x_hat = y;
        self.f_hat = f_y;
        self.append_plane(g_y, self.f_hat);
    }

    /// Null step: appends the plane evaluated at `y` without shifting the
    /// proximity center.
    pub fn append(&mut self, y: &Col<E>, g_y: Col<E>, f_y: E) {
        let h = f_y + dot(&g_y, &Col::from_fn(y.nrows(), |i| self.x_hat[i] - y[i]));
        self.append_plane(g_y, h);
    }

    fn append_plane(&mut self, g: Col<E>, h: E) {
        self.planes.push(Plane { g, h });
    }

    /// Removes planes with negligible multiplier, then — if the bundle is
    /// down to its last free slot — stashes the aggregate plane, keeps the
    /// `k` planes with the largest remaining multipliers, and restores the
    /// aggregate in the reserved slot.
    pub fn compact(&mut self, alpha: &[E], keep: usize) {
        debug_assert_eq!(alpha.len(), self.planes.len());
        let eps = E::EPSILON;

        let mut indexed: Vec<(usize, E)> = alpha.iter().copied().enumerate().filter(|&(_, a)| a >= eps).collect();

        if self.planes.len() >= self.capacity - 1 && indexed.len() >= self.capacity - 1 {
            let n = self.planes[0].g.nrows();
            let mut aggregate_g = Col::<E>::zeros(n);
            let mut aggregate_h = 0.0;
            for &(j, a) in &indexed {
                for i in 0..n {
                    aggregate_g[i] += a * self.planes[j].g[i];
                }
                aggregate_h += a * self.planes[j].h;
            }

            indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            indexed.truncate(keep.min(self.capacity - 1));

            let mut retained: Vec<Plane> = indexed.iter().map(|&(j, _)| self.planes[j].clone()).collect();
            retained.push(Plane { g: aggregate_g, h: aggregate_h });
            self.planes = retained;
        } else {
            let keep_indices: Vec<usize> = indexed.iter().map(|&(j, _)| j).collect();
            self.planes = keep_indices.iter().map(|&j| self.planes[j].clone()).collect();
        }
    }

    /// Solves the doubly-stabilized QP
    /// `minimize r + ‖x − x̂‖²/(2τ)` s.t. `h_j + g_j·(x − x̂) ≤ r` (and
    /// `r ≤ level` when finite).
    ///
    /// The unleveled case (`level = +∞`) goes through its dual: a simplex-constrained
    /// QP solved by projected-gradient ascent. The leveled case bisects `τ`
    /// down from its starting value until the recovered `r*` meets the level
    /// constraint.
    pub fn solve(&self, tau: E, level: E, max_iterations: usize) -> BundleSolution {
        if level.is_finite() {
            self.solve_leveled(tau, level, max_iterations)
        } else {
            self.solve_unleveled(tau, max_iterations)
        }
    }

    fn solve_unleveled(&self, tau: E, max_iterations: usize) -> BundleSolution {
        let m = self.planes.len();
        let n = self.x_hat.nrows();
        if m == 0 {
            return BundleSolution {
                x: self.x_hat.clone(),
                r: E::NEG_INFINITY,
                alpha: Vec::new(),
                lambda: 0.0,
                tau,
            };
        }

        let mut alpha = vec![1.0 / m as E; m];
        let step = 1.0 / (tau * m as E).max(1.0);

        for _ in 0..max_iterations {
            let mut g_bar = Col::<E>::zeros(n);
            for (j, p) in self.planes.iter().enumerate() {
                for i in 0..n {
                    g_bar[i] += alpha[j] * p.g[i];
                }
            }

            // Gradient of the dual objective w.r.t. alpha_j: (h_j - f_hat) - tau * g_j . g_bar.
            let grad: Vec<E> = self
                .planes
                .iter()
                .map(|p| (p.h - self.f_hat) - tau * dot(&p.g, &g_bar))
                .collect();

            let mut next: Vec<E> = alpha.iter().zip(&grad).map(|(a, g)| a + step * g).collect();
            project_simplex(&mut next);

            let diff: E = alpha.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
            alpha = next;
            if diff < 1e-12 {
                break;
            }
        }

        let mut g_bar = Col::<E>::zeros(n);
        for (j, p) in self.planes.iter().enumerate() {
            for i in 0..n {
                g_bar[i] += alpha[j] * p.g[i];
            }
        }
        let x = Col::from_fn(n, |i| self.x_hat[i] - tau * g_bar[i]);
        let r = self.fhat(&x);

        BundleSolution { x, r, alpha, lambda: 0.0, tau }
    }

    fn solve_leveled(&self, tau0: E, level: E, max_iterations: usize) -> BundleSolution {
        let mut tau_lo = 0.0;
        let mut tau_hi = tau0;
        let mut best = self.solve_unleveled(tau_hi, max_iterations);

        if best.r <= level {
            best.lambda = 0.0;
            return best;
        }

        for _ in 0..max_iterations {
            let tau_mid = 0.5 * (tau_lo + tau_hi);
            let candidate = self.solve_unleveled(tau_mid, max_iterations);
            if candidate.r <= level {
                tau_lo = tau_mid;
                best = candidate;
            } else {
                tau_hi = tau_mid;
            }
            if (tau_hi - tau_lo).abs() < 1e-10 {
                break;
            }
        }

        // Implied multiplier from the bracketing step: the marginal rate at
        // which tightening tau trades r against the level constraint.
        best.lambda = if (tau_hi - tau_lo).abs() > E::EPSILON {
            (tau0 - tau_lo) / (tau_hi - tau_lo).max(E::EPSILON)
        } else {
            0.0
        };
        best
    }
}

/// Euclidean projection onto the probability simplex `{a >= 0, sum(a) = 1}`.
fn project_simplex(a: &mut [E]) {
    let n = a.len();
    let mut sorted = a.to_vec();
    sorted.sort_by(|x, y| y.partial_cmp(x).unwrap());

    let mut cumsum = 0.0;
    let mut rho = 0;
    for (i, &v) in sorted.iter().enumerate() {
        cumsum += v;
        if v - (cumsum - 1.0) / (i as E + 1.0) > 0.0 {
            rho = i;
        }
    }
    let theta = (sorted[..=rho].iter().sum::<E>() - 1.0) / (rho as E + 1.0);
    for v in a.iter_mut() {
        *v = (*v - theta).max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_simplex_normalizes_and_is_nonnegative() {
        let mut a = vec![2.0, -1.0, 0.5];
        project_simplex(&mut a);
        assert!(a.iter().all(|&v| v >= 0.0));
        assert!((a.iter().sum::<E>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bundle_moveto_reanchors_planes_and_preserves_model_value() {
        let x0 = Col::from_fn(2, |_| 0.0);
        let mut bundle = Bundle::new(x0, 0.0, 8);
        bundle.append(&Col::from_fn(2, |_| 0.0), Col::from_fn(2, |i| if i == 0 { 1.0 } else { 0.0 }), 1.0);

        let y = Col::from_fn(2, |i| if i == 0 { 1.0 } else { 0.0 });
        bundle.moveto(y.clone(), Col::from_fn(2, |_| 0.0), 2.0);

        assert_eq!(bundle.center()[0], 1.0);
        assert_eq!(bundle.len(), 2);
    }

    #[test]
    fn unleveled_solve_returns_descent_point_for_single_plane() {
        let x0 = Col::from_fn(2, |_| 0.0);
        let mut bundle = Bundle::new(x0, 0.0, 8);
        bundle.append(&Col::from_fn(2, |_| 0.0), Col::from_fn(2, |i| if i == 0 { 1.0 } else { 0.0 }), 0.0);
        let solution = bundle.solve(1.0, E::INFINITY, 200);
        assert!(solution.x[0] < 0.0);
    }
}
