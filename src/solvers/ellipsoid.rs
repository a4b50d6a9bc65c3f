//! Ellipsoid method for convex non-smooth functions (§4.5): maintains an
//! ellipsoid `(c, P)` guaranteed to contain a minimizer, replacing it each
//! iteration with the minimum-volume ellipsoid containing the half-space
//! cut by a subgradient at the center.

use faer::{Col, Mat};
use macros::{explicit_options, use_option};
use problemo::Problem;

use crate::{E, I, Solver, SolverHooks, SolverOptions, SolverState, Status, function::Function};

fn dot(a: faer::ColRef<E>, b: faer::ColRef<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * b[i]).sum()
}

fn mat_vec(p: &Mat<E>, v: faer::ColRef<E>) -> Col<E> {
    let n = p.nrows();
    Col::from_fn(n, |i| (0..n).map(|j| p[(i, j)] * v[j]).sum())
}

/// Ellipsoid method: tracks the best feasible point seen so far since the
/// center is not guaranteed to be a descent step.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "ellipsoid_radius0", type_ = E, default = "10.0", description = "Initial ellipsoid radius (P0 = radius^2 . I).")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
#[use_option(name = "solver_tolerance", type_ = E, default = "1e-6", description = "Stop once the ellipsoid's volume proxy (trace of P) falls below this.")]
pub struct Ellipsoid<'a> {
    f: &'a mut dyn Function,
    p: Mat<E>,
    best_x: Option<Col<E>>,
    best_f: E,
}

impl<'a> Ellipsoid<'a> {
    pub fn new(f: &'a mut dyn Function, options: &SolverOptions) -> Self {
        let n = f.size();
        let r2 = options.ellipsoid_radius0.powi(2);
        Self {
            options: options.into(),
            f,
            p: Mat::from_fn(n, n, |i, j| if i == j { r2 } else { 0.0 }),
            best_x: None,
            best_f: E::INFINITY,
        }
    }
}

impl<'a> Solver for Ellipsoid<'a> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let n = state.x().nrows();
        let n_e = n as E;

        for _ in 0..self.options.solver_max_iterations {
            let mut g = Col::<E>::zeros(n);
            let fx = self.f.value_and_grad(state.x().as_ref(), &mut g);
            state.set_value(fx);
            state.set_gradient(g.clone());
            if !state.valid() {
                return Ok(Status::Failed);
            }

            if fx < self.best_f {
                self.best_f = fx;
                self.best_x = Some(state.x().clone());
            }

            let pg = mat_vec(&self.p, g.as_ref());
            let gpg = dot(g.as_ref(), pg.as_ref());
            if gpg <= E::EPSILON {
                return Ok(Status::Converged);
            }
            let denom = gpg.sqrt();
            let g_norm = Col::from_fn(n, |i| pg[i] / denom);

            let x_next = Col::from_fn(n, |i| state.x()[i] - g_norm[i] / (n_e + 1.0));

            let mut p_next = Mat::<E>::zeros(n, n);
            let scale = n_e * n_e / (n_e * n_e - 1.0);
            let shrink = 2.0 / (n_e + 1.0);
            for i in 0..n {
                for j in 0..n {
                    p_next[(i, j)] = scale * (self.p[(i, j)] - shrink * g_norm[i] * g_norm[j]);
                }
            }

            let delta_x = (0..n).map(|i| (x_next[i] - state.x()[i]).powi(2)).sum::<E>().sqrt();
            state.push_history(0.0, delta_x);
            *state.x_mut() = x_next;
            self.p = p_next;
            state.advance();

            hooks.callback.call(state);
            if let Some(status) = hooks.terminator.check(state) {
                return Ok(status);
            }

            let trace: E = (0..n).map(|i| self.p[(i, i)]).sum();
            if trace.sqrt() <= self.options.solver_tolerance {
                return Ok(Status::Converged);
            }
        }
        if let Some(best) = self.best_x.take() {
            *state.x_mut() = best;
        }
        Ok(Status::MaxIters)
    }
}

#[cfg(test)]
mod tests {
    use crate::function::Sphere;

    use super::*;

    #[test]
    fn ellipsoid_shrinks_toward_minimum_on_sphere() {
        let options = SolverOptions::new();
        let mut f = Sphere::new(2);
        let mut state = SolverState::new(Col::from_fn(2, |i| (i as E + 1.0)));
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::EvalBudgetTerminator::new(100_000)),
        );
        let mut solver = Ellipsoid::new(&mut f, &options);
        let status = solver.solve(&mut state, &mut hooks).unwrap();
        assert!(matches!(status, Status::Converged | Status::MaxIters));
        for i in 0..2 {
            assert!(state.x()[i].abs() < 0.5);
        }
    }
}
