//! Universal gradient methods (PGM, DGM, FGM) for objectives with
//! Hölder-continuous gradients: each iteration estimates a local Lipschitz
//! constant by doubling until an `ε/2`-relaxed sufficient-decrease test
//! holds, then halves the estimate for the next iteration (§4.5).

use faer::Col;
use macros::{explicit_options, use_option};
use problemo::Problem;

use crate::{E, I, Solver, SolverHooks, SolverOptions, SolverState, Status, function::Function};

fn dot(a: faer::ColRef<E>, b: faer::ColRef<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * b[i]).sum()
}

fn norm_sq(a: faer::ColRef<E>) -> E {
    dot(a, a)
}

/// Doubles `l` from `l_prev/2` until the relaxed sufficient-decrease test
/// `f(x - g/L) <= f(x) - ||g||^2/(2L) + eps/2` holds, returning the accepted
/// `(L, x_next, f_next, g_next)`.
fn backtrack_lipschitz(
    f: &mut dyn Function,
    x: &Col<E>,
    fx: E,
    g: &Col<E>,
    l_prev: E,
    epsilon: E,
    max_doublings: usize,
) -> (E, Col<E>, E, Col<E>) {
    let n = x.nrows();
    let mut l = (l_prev / 2.0).max(E::EPSILON);
    for _ in 0..max_doublings {
        let x_next = Col::from_fn(n, |i| x[i] - g[i] / l);
        let mut g_next = Col::<E>::zeros(n);
        let f_next = f.value_and_grad(x_next.as_ref(), &mut g_next);
        if f_next <= fx - norm_sq(g.as_ref()) / (2.0 * l) + epsilon / 2.0 {
            return (l, x_next, f_next, g_next);
        }
        l *= 2.0;
    }
    let x_next = Col::from_fn(n, |i| x[i] - g[i] / l);
    let mut g_next = Col::<E>::zeros(n);
    let f_next = f.value_and_grad(x_next.as_ref(), &mut g_next);
    (l, x_next, f_next, g_next)
}

/// Primal gradient method: a plain gradient step at the accepted Lipschitz
/// estimate.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "universal_epsilon", type_ = E, default = "1e-6", description = "Target accuracy epsilon for the universal gradient methods' relaxed sufficient-decrease test.")]
#[use_option(name = "universal_l0", type_ = E, default = "1.0", description = "Initial Lipschitz-constant estimate for the universal gradient methods.")]
#[use_option(name = "universal_max_doublings", type_ = I, default = "50", description = "Maximum Lipschitz-estimate doublings per iteration.")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
pub struct ProjectedGradientMethod<'a> {
    f: &'a mut dyn Function,
    l: E,
}

impl<'a> ProjectedGradientMethod<'a> {
    pub fn new(f: &'a mut dyn Function, options: &SolverOptions) -> Self {
        let l = options.universal_l0;
        Self { options: options.into(), f, l }
    }
}

impl<'a> Solver for ProjectedGradientMethod<'a> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let epsilon = self.options.universal_epsilon;
        let max_doublings = self.options.universal_max_doublings;

        let mut g = Col::<E>::zeros(state.x().nrows());
        let mut fx = self.f.value_and_grad(state.x().as_ref(), &mut g);
        state.set_value(fx);
        state.set_gradient(g.clone());

        for _ in 0..self.options.solver_max_iterations {
            let (l, x_next, f_next, g_next) = backtrack_lipschitz(self.f, state.x(), fx, &g, self.l, epsilon, max_doublings);
            self.l = l;

            let delta_x = (0..x_next.nrows()).map(|i| (x_next[i] - state.x()[i]).powi(2)).sum::<E>().sqrt();
            state.push_history(fx - f_next, delta_x);
            *state.x_mut() = x_next;
            state.set_value(f_next);
            state.set_gradient(g_next.clone());
            state.advance();

            if !state.valid() {
                return Ok(Status::Failed);
            }

            hooks.callback.call(state);
            if let Some(status) = hooks.terminator.check(state) {
                return Ok(status);
            }
            if norm_sq(g_next.as_ref()).sqrt() <= epsilon {
                return Ok(Status::Converged);
            }

            fx = f_next;
            g = g_next;
        }
        Ok(Status::MaxIters)
    }
}

/// Dual gradient method: maintains a running sum of gradients (dual
/// averaging) alongside the primal sequence, matching the universal
/// gradient methods' shared Lipschitz-backtracking core with a second
/// (dual) point sequence.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "universal_epsilon", type_ = E, default = "1e-6", description = "Target accuracy epsilon for the universal gradient methods' relaxed sufficient-decrease test.")]
#[use_option(name = "universal_l0", type_ = E, default = "1.0", description = "Initial Lipschitz-constant estimate for the universal gradient methods.")]
#[use_option(name = "universal_max_doublings", type_ = I, default = "50", description = "Maximum Lipschitz-estimate doublings per iteration.")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
pub struct DualGradientMethod<'a> {
    f: &'a mut dyn Function,
    l: E,
    x0: Col<E>,
    grad_sum: Col<E>,
    a_sum: E,
}

impl<'a> DualGradientMethod<'a> {
    pub fn new(f: &'a mut dyn Function, x0: Col<E>, options: &SolverOptions) -> Self {
        let l = options.universal_l0;
        let n = x0.nrows();
        Self {
            options: options.into(),
            f,
            l,
            x0,
            grad_sum: Col::zeros(n),
            a_sum: 0.0,
        }
    }
}

impl<'a> Solver for DualGradientMethod<'a> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let epsilon = self.options.universal_epsilon;
        let max_doublings = self.options.universal_max_doublings;
        let n = state.x().nrows();

        let mut g = Col::<E>::zeros(n);
        let mut fx = self.f.value_and_grad(state.x().as_ref(), &mut g);
        state.set_value(fx);
        state.set_gradient(g.clone());

        for _ in 0..self.options.solver_max_iterations {
            let (l, y_next, f_next, g_next) = backtrack_lipschitz(self.f, state.x(), fx, &g, self.l, epsilon, max_doublings);
            self.l = l;

            let a_k = 1.0 / l;
            self.a_sum += a_k;
            for i in 0..n {
                self.grad_sum[i] += a_k * g[i];
            }
            // Dual-averaging point: the prox-center moved against the
            // accumulated gradient, weighted by the running step sum.
            let z_next = Col::from_fn(n, |i| self.x0[i] - self.grad_sum[i]);
            let x_next = Col::from_fn(n, |i| (y_next[i] + z_next[i]) / 2.0);

            let delta_x = (0..n).map(|i| (x_next[i] - state.x()[i]).powi(2)).sum::<E>().sqrt();
            state.push_history(fx - f_next, delta_x);
            *state.x_mut() = x_next;
            state.set_value(f_next);
            state.set_gradient(g_next.clone());
            state.advance();

            if !state.valid() {
                return Ok(Status::Failed);
            }

            hooks.callback.call(state);
            if let Some(status) = hooks.terminator.check(state) {
                return Ok(status);
            }
            if norm_sq(g_next.as_ref()).sqrt() <= epsilon {
                return Ok(Status::Converged);
            }

            fx = f_next;
            g = g_next;
        }
        Ok(Status::MaxIters)
    }
}

/// Fast gradient method: Nesterov-style momentum combining the primal
/// (`x`), auxiliary (`y`), and dual-averaging (`v`) sequences, with momentum
/// weights `a_k` chosen so `A_k = Σ a_i` grows quadratically in `1/L`.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "universal_epsilon", type_ = E, default = "1e-6", description = "Target accuracy epsilon for the universal gradient methods' relaxed sufficient-decrease test.")]
#[use_option(name = "universal_l0", type_ = E, default = "1.0", description = "Initial Lipschitz-constant estimate for the universal gradient methods.")]
#[use_option(name = "universal_max_doublings", type_ = I, default = "50", description = "Maximum Lipschitz-estimate doublings per iteration.")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
pub struct FastGradientMethod<'a> {
    f: &'a mut dyn Function,
    l: E,
    v: Col<E>,
    a_sum: E,
}

impl<'a> FastGradientMethod<'a> {
    pub fn new(f: &'a mut dyn Function, x0: Col<E>, options: &SolverOptions) -> Self {
        let l = options.universal_l0;
        Self {
            options: options.into(),
            f,
            l,
            v: x0,
            a_sum: 0.0,
        }
    }
}

impl<'a> Solver for FastGradientMethod<'a> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let epsilon = self.options.universal_epsilon;
        let max_doublings = self.options.universal_max_doublings;
        let n = state.x().nrows();

        let mut g = Col::<E>::zeros(n);
        let mut fx = self.f.value_and_grad(state.x().as_ref(), &mut g);
        state.set_value(fx);
        state.set_gradient(g.clone());

        for _ in 0..self.options.solver_max_iterations {
            let (l, y_next, f_next, g_next) = backtrack_lipschitz(self.f, state.x(), fx, &g, self.l, epsilon, max_doublings);
            self.l = l;

            let a_k = (1.0 + (1.0 + 4.0 * l * self.a_sum).sqrt()) / (2.0 * l);
            let a_sum_next = self.a_sum + a_k;
            let tau = a_k / a_sum_next;

            let v_next = Col::from_fn(n, |i| self.v[i] - a_k * g_next[i]);
            let x_next = Col::from_fn(n, |i| tau * v_next[i] + (1.0 - tau) * y_next[i]);

            let mut g_x = Col::<E>::zeros(n);
            let f_x = self.f.value_and_grad(x_next.as_ref(), &mut g_x);

            let delta_x = (0..n).map(|i| (x_next[i] - state.x()[i]).powi(2)).sum::<E>().sqrt();
            state.push_history(fx - f_x, delta_x);
            *state.x_mut() = x_next;
            state.set_value(f_x);
            state.set_gradient(g_x.clone());
            state.advance();

            self.v = v_next;
            self.a_sum = a_sum_next;

            if !state.valid() {
                return Ok(Status::Failed);
            }

            hooks.callback.call(state);
            if let Some(status) = hooks.terminator.check(state) {
                return Ok(status);
            }
            if norm_sq(g_x.as_ref()).sqrt() <= epsilon {
                return Ok(Status::Converged);
            }

            fx = f_x;
            g = g_x;
        }
        Ok(Status::MaxIters)
    }
}

#[cfg(test)]
mod tests {
    use crate::function::Sphere;

    use super::*;

    #[test]
    fn pgm_converges_on_sphere() {
        let options = SolverOptions::new();
        let mut f = Sphere::new(3);
        let mut state = SolverState::new(Col::from_fn(3, |i| (i as E + 1.0)));
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::ConvergenceTerminator::new(1e-6)),
        );
        let mut solver = ProjectedGradientMethod::new(&mut f, &options);
        let status = solver.solve(&mut state, &mut hooks).unwrap();
        assert!(matches!(status, Status::Converged | Status::MaxIters));
        for i in 0..3 {
            assert!(state.x()[i].abs() < 1e-2);
        }
    }

    #[test]
    fn fgm_converges_on_sphere() {
        let options = SolverOptions::new();
        let mut f = Sphere::new(3);
        let x0 = Col::from_fn(3, |i| (i as E + 1.0));
        let mut state = SolverState::new(x0.clone());
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::ConvergenceTerminator::new(1e-6)),
        );
        let mut solver = FastGradientMethod::new(&mut f, x0, &options);
        let status = solver.solve(&mut state, &mut hooks).unwrap();
        assert!(matches!(status, Status::Converged | Status::MaxIters));
        for i in 0..3 {
            assert!(state.x()[i].abs() < 1e-2);
        }
    }
}
