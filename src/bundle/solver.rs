//! Proximal bundle method solver (§4.6): builds a cutting-plane model of a
//! (possibly non-smooth) convex function, solves its doubly-stabilized QP
//! subproblem each iteration, and uses [`CurveSearch`] to decide between a
//! serious step and a null step.

use faer::Col;
use macros::{explicit_options, use_option};
use problemo::Problem;

use crate::{
    E, I, Solver, SolverHooks, SolverOptions, SolverState, Status,
    bundle::{Bundle, CurveSearch},
    function::Function,
};

#[explicit_options(name = SolverOptions)]
#[use_option(name = "bundle_capacity", type_ = I, default = "50", description = "Maximum number of cutting planes retained before compaction.")]
#[use_option(name = "bundle_keep", type_ = I, default = "10", description = "Number of planes with the largest multipliers retained on compaction.")]
#[use_option(name = "bundle_tau0", type_ = E, default = "1.0", description = "Initial proximity parameter for the bundle subproblem.")]
#[use_option(name = "bundle_level", type_ = E, default = "inf", description = "Level constraint on the model value (+inf disables leveling).")]
#[use_option(name = "bundle_subproblem_iterations", type_ = I, default = "200", description = "Maximum projected-gradient iterations for the bundle subproblem.")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
#[use_option(name = "solver_tolerance", type_ = E, default = "1e-6", description = "Stop once the predicted decrease falls below this.")]
pub struct ProximalBundle<'a> {
    f: &'a mut dyn Function,
    curve_search: CurveSearch,
    tau: E,
}

impl<'a> ProximalBundle<'a> {
    pub fn new(f: &'a mut dyn Function, options: &SolverOptions) -> Self {
        let tau = options.bundle_tau0;
        Self {
            options: options.into(),
            f,
            curve_search: CurveSearch::new(options),
            tau,
        }
    }
}

impl<'a> Solver for ProximalBundle<'a> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let n = state.x().nrows();
        let capacity = self.options.bundle_capacity as usize;
        let keep = self.options.bundle_keep as usize;
        let level = self.options.bundle_level;
        let sub_iters = self.options.bundle_subproblem_iterations as usize;

        let mut g0 = Col::<E>::zeros(n);
        let f0 = self.f.value_and_grad(state.x().as_ref(), &mut g0);
        state.set_value(f0);
        state.set_gradient(g0.clone());
        if !state.valid() {
            return Ok(Status::Failed);
        }

        let mut bundle = Bundle::new(state.x().clone(), f0, capacity);
        bundle.append(state.x(), g0, f0);

        for _ in 0..self.options.solver_max_iterations {
            let solution = bundle.solve(self.tau, level, sub_iters);
            let predicted_decrease = bundle.center_value() - solution.r;

            if predicted_decrease <= self.options.solver_tolerance {
                return Ok(Status::Converged);
            }

            let (f_y, g_y) = self.curve_search.evaluate(self.f, &solution.x);
            if !f_y.is_finite() {
                return Ok(Status::Failed);
            }

            let plane_improvement = {
                let candidate_h = f_y + (0..n).map(|i| g_y[i] * (bundle.center()[i] - solution.x[i])).sum::<E>();
                candidate_h - bundle.fhat(&solution.x)
            };

            match self.curve_search.classify(bundle.center_value(), f_y, predicted_decrease, plane_improvement) {
                Some(crate::bundle::curve_search::StepKind::Serious) => {
                    let delta_x = (0..n).map(|i| (solution.x[i] - bundle.center()[i]).powi(2)).sum::<E>().sqrt();
                    let g_y_clone = g_y.clone();
                    bundle.moveto(solution.x.clone(), g_y, f_y);
                    state.push_history(predicted_decrease, delta_x);
                    *state.x_mut() = solution.x;
                    state.set_value(f_y);
                    state.set_gradient(g_y_clone);
                }
                Some(crate::bundle::curve_search::StepKind::Null) => {
                    bundle.append(&solution.x, g_y, f_y);
                    state.push_history(0.0, 0.0);
                }
                None => {
                    bundle.append(&solution.x, g_y, f_y);
                    state.push_history(0.0, 0.0);
                }
            }

            bundle.compact(&solution.alpha, keep);
            state.advance();

            hooks.callback.call(state);
            if let Some(status) = hooks.terminator.check(state) {
                return Ok(status);
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
    fn proximal_bundle_decreases_objective_on_sphere() {
        let options = SolverOptions::new();
        let mut f = Sphere::new(2);
        let x0 = Col::from_fn(2, |i| (i as E + 1.0));
        let f0 = (0..2).map(|i| x0[i] * x0[i]).sum::<E>();
        let mut state = SolverState::new(x0);
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::EvalBudgetTerminator::new(10_000)),
        );
        let mut solver = ProximalBundle::new(&mut f, &options);
        solver.solve(&mut state, &mut hooks).unwrap();
        let f_final = (0..2).map(|i| state.x()[i] * state.x()[i]).sum::<E>();
        assert!(f_final < f0);
    }
}
