//! Mehrotra predictor-corrector primal-dual interior-point method (§4.7).

use faer::{Col, ColRef, Mat};
use macros::{explicit_options, use_option};
use problemo::Problem;

use crate::{
    E, I, OptimizationProgram, Solver, SolverHooks, SolverOptions, SolverState, Status,
    linalg::{ldlt::DenseLdlt, solver::Solver as LinearSolver},
    program::Program,
};

fn dot(a: ColRef<E>, b: ColRef<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * b[i]).sum()
}

fn mat_vec(m: &Mat<E>, v: ColRef<E>) -> Col<E> {
    Col::from_fn(m.nrows(), |i| (0..m.ncols()).map(|j| m[(i, j)] * v[j]).sum())
}

fn mat_t_vec(m: &Mat<E>, v: ColRef<E>) -> Col<E> {
    Col::from_fn(m.ncols(), |j| (0..m.nrows()).map(|i| m[(i, j)] * v[i]).sum())
}

/// Search direction solved for in (x, nu); s and lambda are recovered
/// algebraically from the slack/complementarity blocks.
struct Direction {
    dx: Col<E>,
    ds: Col<E>,
    dlambda: Col<E>,
    dnu: Col<E>,
}

#[explicit_options(name = SolverOptions)]
#[use_option(name = "program_max_iterations", type_ = I, default = "100", description = "Maximum number of interior-point iterations.")]
#[use_option(name = "program_tolerance", type_ = E, default = "1e-8", description = "Stop once max(||r_dual||_inf, ||r_prim||_inf) and the duality measure mu fall below this.")]
#[use_option(name = "program_eta", type_ = E, default = "0.99", description = "Fraction-to-boundary step-length safety factor.")]
pub struct MehrotraInteriorPoint<'a> {
    program: &'a Program,
    ldlt: DenseLdlt,
}

impl<'a> MehrotraInteriorPoint<'a> {
    pub fn new(program: &'a Program, options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
            program,
            ldlt: DenseLdlt::new(),
        }
    }

    /// Assembles the reduced symmetric KKT saddle
    /// `[[Q + Gᵀ D G, Aᵀ], [A, 0]]` with `D = diag(λ/s)` and factorizes it.
    fn factorize_kkt(&mut self, s: &Col<E>, lambda: &Col<E>) -> Result<(), Problem> {
        let n = self.program.n();
        let p = self.program.p();
        let m = self.program.m();
        let g = self.program.g();
        let a = self.program.a();

        let d: Vec<E> = (0..m).map(|i| lambda[i] / s[i].max(E::EPSILON)).collect();

        let mut gt_dg = Mat::<E>::zeros(n, n);
        for k in 0..m {
            for i in 0..n {
                let gik = g[(k, i)];
                if gik == 0.0 {
                    continue;
                }
                for j in 0..n {
                    gt_dg[(i, j)] += d[k] * gik * g[(k, j)];
                }
            }
        }

        let q = self.program.q();
        let total = n + p;
        let mat = Mat::from_fn(total, total, |i, j| {
            if i < n && j < n {
                q[(i, j)] + gt_dg[(i, j)]
            } else if i < n && j >= n {
                a[(j - n, i)]
            } else if i >= n && j < n {
                a[(i - n, j)]
            } else {
                0.0
            }
        });

        self.ldlt.factorize(mat.as_ref())
    }

    /// Solves the reduced KKT system for `(dx, dnu)` given the dual/primal
    /// residual and the complementarity right-hand side `r_comp_rhs`
    /// (either the raw complementarity residual for the affine predictor, or
    /// the centered/corrected residual for the corrector step), then
    /// recovers `ds`/`dlambda` from the eliminated equations.
    fn solve_direction(&self, r_dual: &Col<E>, r_primal: &Col<E>, r_slack: &Col<E>, r_comp_rhs: &Col<E>, s: &Col<E>, lambda: &Col<E>) -> Result<Direction, Problem> {
        let n = self.program.n();
        let p = self.program.p();
        let m = self.program.m();
        let g = self.program.g();

        let d: Vec<E> = (0..m).map(|i| lambda[i] / s[i].max(E::EPSILON)).collect();
        let s_inv: Vec<E> = (0..m).map(|i| 1.0 / s[i].max(E::EPSILON)).collect();

        // bracket = D*r_slack - S^{-1}*r_comp_rhs
        let bracket = Col::from_fn(m, |i| d[i] * r_slack[i] - s_inv[i] * r_comp_rhs[i]);
        let gt_bracket = mat_t_vec(g, bracket.as_ref());

        let mut rhs = Col::<E>::zeros(n + p);
        for i in 0..n {
            rhs[i] = -r_dual[i] - gt_bracket[i];
        }
        for i in 0..p {
            rhs[n + i] = -r_primal[i];
        }

        let sol = self.ldlt.solve(rhs.as_ref())?;
        let dx = Col::from_fn(n, |i| sol[i]);
        let dnu = Col::from_fn(p, |i| sol[n + i]);

        let gdx = mat_vec(g, dx.as_ref());
        let ds = Col::from_fn(m, |i| -r_slack[i] - gdx[i]);
        let dlambda = Col::from_fn(m, |i| s_inv[i] * r_comp_rhs[i] - d[i] * ds[i]);

        Ok(Direction { dx, ds, dlambda, dnu })
    }

    /// Largest `alpha in (0, 1]` keeping `v + alpha*dv` strictly positive,
    /// shrunk by the fraction-to-boundary factor `eta`.
    fn max_step(v: &Col<E>, dv: &Col<E>, eta: E) -> E {
        let mut alpha = 1.0;
        for i in 0..v.nrows() {
            if dv[i] < 0.0 {
                alpha = alpha.min(-eta * v[i] / dv[i]);
            }
        }
        alpha.clamp(0.0, 1.0)
    }
}

impl<'a> Solver for MehrotraInteriorPoint<'a> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let n = self.program.n();
        let p = self.program.p();
        let m = self.program.m();
        let eta = self.options.program_eta;
        let tol = self.options.program_tolerance;

        for _ in 0..self.options.program_max_iterations {
            let residual = self.program.compute_residual(state);
            let s = state.s().clone();
            let lambda = state.lambda().clone();
            let mu = dot(s.as_ref(), lambda.as_ref()) / m as E;

            if residual.primal_inf_norm().max(residual.dual_inf_norm()) < tol && mu < tol {
                return Ok(Status::Converged);
            }

            if self.factorize_kkt(&s, &lambda).is_err() {
                return Ok(Status::Failed);
            }

            let affine = match self.solve_direction(
                residual.dual_feasibility(),
                residual.primal_feasibility(),
                residual.slack_feasibility(),
                residual.complementarity(),
                &s,
                &lambda,
            ) {
                Ok(direction) => direction,
                Err(_) => return Ok(Status::Failed),
            };

            let alpha_aff_p = Self::max_step(&s, &affine.ds, 1.0);
            let alpha_aff_d = Self::max_step(&lambda, &affine.dlambda, 1.0);
            let s_aff = Col::from_fn(m, |i| s[i] + alpha_aff_p * affine.ds[i]);
            let lambda_aff = Col::from_fn(m, |i| lambda[i] + alpha_aff_d * affine.dlambda[i]);
            let mu_aff = dot(s_aff.as_ref(), lambda_aff.as_ref()) / m as E;

            let sigma = (mu_aff / mu.max(E::EPSILON)).clamp(0.0, 1.0).powi(3);

            let corrected_comp = Col::from_fn(m, |i| residual.complementarity()[i] + affine.ds[i] * affine.dlambda[i] - sigma * mu);

            let step = match self.solve_direction(
                residual.dual_feasibility(),
                residual.primal_feasibility(),
                residual.slack_feasibility(),
                &corrected_comp,
                &s,
                &lambda,
            ) {
                Ok(direction) => direction,
                Err(_) => return Ok(Status::Failed),
            };

            let alpha_p = eta.min(Self::max_step(&s, &step.ds, eta));
            let alpha_d = eta.min(Self::max_step(&lambda, &step.dlambda, eta));

            let x_next = Col::from_fn(n, |i| state.x()[i] + alpha_p * step.dx[i]);
            let s_next = Col::from_fn(m, |i| s[i] + alpha_p * step.ds[i]);
            let lambda_next = Col::from_fn(m, |i| lambda[i] + alpha_d * step.dlambda[i]);
            let nu_next = Col::from_fn(p, |i| state.nu()[i] + alpha_d * step.dnu[i]);

            if !x_next.iter().all(|v| v.is_finite()) || s_next.iter().any(|v| *v <= 0.0) || lambda_next.iter().any(|v| *v <= 0.0) {
                return Ok(Status::Failed);
            }

            let delta_x = (0..n).map(|i| step.dx[i].powi(2)).sum::<E>().sqrt();
            state.push_history(mu, delta_x);
            *state.x_mut() = x_next;
            *state.s_mut() = s_next;
            *state.lambda_mut() = lambda_next;
            *state.nu_mut() = nu_next;
            state.set_mu(mu);
            state.set_sigma(sigma);
            state.set_alphas(alpha_p, alpha_d);
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
    use super::*;

    /// `minimize x1 + x2` s.t. `x1 + x2 = 1`, `x >= 0` — optimum anywhere on
    /// the simplex edge with value 1; the interior-point iterates should
    /// converge to a feasible, near-optimal point.
    #[test]
    fn converges_on_simple_lp() {
        let q = Mat::<E>::zeros(2, 2);
        let c = Col::from_fn(2, |_| 1.0);
        let a = Mat::from_fn(1, 2, |_, _| 1.0);
        let b = Col::from_fn(1, |_| 1.0);
        let g = Mat::from_fn(2, 2, |i, j| if i == j { -1.0 } else { 0.0 });
        let h = Col::from_fn(2, |_| 0.0);
        let program = Program::new(q, c, a, b, g, h).unwrap();

        let options = SolverOptions::new();
        let x0 = Col::from_fn(2, |_| 0.5);
        let s0 = Col::from_fn(2, |_| 1.0);
        let lambda0 = Col::from_fn(2, |_| 1.0);
        let nu0 = Col::from_fn(1, |_| 0.0);
        let mut state = SolverState::new_program(x0, s0, lambda0, nu0);
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::EvalBudgetTerminator::new(100_000)),
        );
        let mut solver = MehrotraInteriorPoint::new(&program, &options);
        let status = solver.solve(&mut state, &mut hooks).unwrap();
        assert!(matches!(status, Status::Converged | Status::MaxIters));
        assert!(program.feasible(state.x().as_ref(), 1e-3));
    }
}
