//! Accelerated subgradient methods for convex (possibly `μ`-strongly
//! convex) problems: ASGA-2 maintains two point sequences, ASGA-4 four
//! (§4.5).

use faer::Col;
use macros::{explicit_options, use_option};
use problemo::Problem;

use crate::{E, I, Solver, SolverHooks, SolverOptions, SolverState, Status, function::Function};

fn norm(a: faer::ColRef<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * a[i]).sum::<E>().sqrt()
}

/// Backtracks `l` within `[l_prev·gamma2, l_prev·gamma1]` until the
/// subgradient step's descent test holds.
fn backtrack(
    f: &mut dyn Function,
    x: &Col<E>,
    g: &Col<E>,
    l_prev: E,
    gamma1: E,
    gamma2: E,
    max_doublings: usize,
) -> (E, Col<E>, E) {
    let n = x.nrows();
    let mut l = (l_prev * gamma2).max(E::EPSILON);
    let gnorm = norm(g.as_ref()).max(E::EPSILON);
    for _ in 0..max_doublings {
        let x_next = Col::from_fn(n, |i| x[i] - g[i] / (l * gnorm));
        let f_next = f.value(x_next.as_ref());
        if f_next <= f.value(x.as_ref()) - norm(g.as_ref()).powi(2) / (2.0 * l) {
            return (l, x_next, f_next);
        }
        l *= gamma1;
    }
    let x_next = Col::from_fn(n, |i| x[i] - g[i] / (l * gnorm));
    let f_next = f.value(x_next.as_ref());
    (l, x_next, f_next)
}

/// Two-sequence accelerated subgradient method (`x`, `y`).
#[explicit_options(name = SolverOptions)]
#[use_option(name = "asga_mu", type_ = E, default = "0.0", description = "Strong-convexity modulus assumed by the ASGA solvers (0 for merely convex).")]
#[use_option(name = "asga_gamma1", type_ = E, default = "2.0", description = "ASGA Lipschitz-estimate expansion factor (> 1).")]
#[use_option(name = "asga_gamma2", type_ = E, default = "0.5", description = "ASGA Lipschitz-estimate contraction factor (in (0,1)).")]
#[use_option(name = "asga_max_doublings", type_ = I, default = "50", description = "Maximum Lipschitz-estimate backtracking steps per ASGA iteration.")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
#[use_option(name = "solver_tolerance", type_ = E, default = "1e-6", description = "Gradient stationarity tolerance.")]
pub struct Asga2<'a> {
    f: &'a mut dyn Function,
    l: E,
    s: E,
}

impl<'a> Asga2<'a> {
    pub fn new(f: &'a mut dyn Function, options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
            f,
            l: 1.0,
            s: 0.0,
        }
    }
}

impl<'a> Solver for Asga2<'a> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let (gamma1, gamma2) = (self.options.asga_gamma1, self.options.asga_gamma2);
        let mu = self.options.asga_mu;
        let max_doublings = self.options.asga_max_doublings;
        let n = state.x().nrows();
        let mut y = state.x().clone();

        for _ in 0..self.options.solver_max_iterations {
            let mut g = Col::<E>::zeros(n);
            let fy = self.f.value_and_grad(y.as_ref(), &mut g);
            state.set_value(fy);
            state.set_gradient(g.clone());
            if !state.valid() {
                return Ok(Status::Failed);
            }

            let (l, x_next, f_next) = backtrack(self.f, &y, &g, self.l, gamma1, gamma2, max_doublings);
            self.l = l;
            self.s += 1.0 / l;

            // The step size blends the accelerated and proximal terms via
            // mu and the running sum S_k, per the ASGA-2 recursion.
            let beta = (1.0 / l) / (self.s + mu * self.s * self.s).max(E::EPSILON);
            let y_next = Col::from_fn(n, |i| x_next[i] + beta * (x_next[i] - y[i]));

            let delta_x = (0..n).map(|i| (x_next[i] - state.x()[i]).powi(2)).sum::<E>().sqrt();
            state.push_history(fy - f_next, delta_x);
            *state.x_mut() = x_next;
            state.advance();

            hooks.callback.call(state);
            if let Some(status) = hooks.terminator.check(state) {
                return Ok(status);
            }
            if norm(g.as_ref()) <= self.options.solver_tolerance {
                return Ok(Status::Converged);
            }

            y = y_next;
        }
        Ok(Status::MaxIters)
    }
}

/// Four-sequence accelerated subgradient method (`x`, `y`, `z`, `v`),
/// trading extra bookkeeping for a tighter convergence constant than
/// [`Asga2`] on strongly convex problems.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "asga_mu", type_ = E, default = "0.0", description = "Strong-convexity modulus assumed by the ASGA solvers (0 for merely convex).")]
#[use_option(name = "asga_gamma1", type_ = E, default = "2.0", description = "ASGA Lipschitz-estimate expansion factor (> 1).")]
#[use_option(name = "asga_gamma2", type_ = E, default = "0.5", description = "ASGA Lipschitz-estimate contraction factor (in (0,1)).")]
#[use_option(name = "asga_max_doublings", type_ = I, default = "50", description = "Maximum Lipschitz-estimate backtracking steps per ASGA iteration.")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
#[use_option(name = "solver_tolerance", type_ = E, default = "1e-6", description = "Gradient stationarity tolerance.")]
pub struct Asga4<'a> {
    f: &'a mut dyn Function,
    l: E,
    s: E,
    v: Col<E>,
}

impl<'a> Asga4<'a> {
    pub fn new(f: &'a mut dyn Function, x0: Col<E>, options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
            f,
            l: 1.0,
            s: 0.0,
            v: x0,
        }
    }
}

impl<'a> Solver for Asga4<'a> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let (gamma1, gamma2) = (self.options.asga_gamma1, self.options.asga_gamma2);
        let mu = self.options.asga_mu;
        let max_doublings = self.options.asga_max_doublings;
        let n = state.x().nrows();

        for _ in 0..self.options.solver_max_iterations {
            let tau = 1.0 / (1.0 + mu * self.s).max(1.0);
            let y = Col::from_fn(n, |i| tau * self.v[i] + (1.0 - tau) * state.x()[i]);

            let mut g = Col::<E>::zeros(n);
            let fy = self.f.value_and_grad(y.as_ref(), &mut g);
            state.set_value(fy);
            state.set_gradient(g.clone());
            if !state.valid() {
                return Ok(Status::Failed);
            }

            let (l, z_next, f_next) = backtrack(self.f, &y, &g, self.l, gamma1, gamma2, max_doublings);
            self.l = l;
            let a_k = 1.0 / l;
            self.s += a_k;

            let v_next = Col::from_fn(n, |i| (self.v[i] + mu * a_k * y[i] - a_k * g[i]) / (1.0 + mu * a_k));
            let x_next = Col::from_fn(n, |i| tau * v_next[i] + (1.0 - tau) * z_next[i]);

            let delta_x = (0..n).map(|i| (x_next[i] - state.x()[i]).powi(2)).sum::<E>().sqrt();
            state.push_history(fy - f_next, delta_x);
            *state.x_mut() = x_next;
            state.advance();

            self.v = v_next;

            hooks.callback.call(state);
            if let Some(status) = hooks.terminator.check(state) {
                return Ok(status);
            }
            if norm(g.as_ref()) <= self.options.solver_tolerance {
                return Ok(Status::Converged);
            }
        }
        Ok(Status::MaxIters)
    }
}

#[cfg(test)]
mod tests {
    use crate::function::Sphere;

    use super::*;

    #[test]
    fn asga2_decreases_objective_on_sphere() {
        let options = SolverOptions::new();
        let mut f = Sphere::new(3);
        let x0 = Col::from_fn(3, |i| (i as E + 1.0));
        let f0 = (0..3).map(|i| x0[i] * x0[i]).sum::<E>();
        let mut state = SolverState::new(x0);
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::EvalBudgetTerminator::new(10_000)),
        );
        let mut solver = Asga2::new(&mut f, &options);
        solver.solve(&mut state, &mut hooks).unwrap();
        let f_final = (0..3).map(|i| state.x()[i] * state.x()[i]).sum::<E>();
        assert!(f_final < f0);
    }
}
