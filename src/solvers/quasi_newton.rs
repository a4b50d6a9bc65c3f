//! Quasi-Newton solver maintaining an inverse-Hessian approximation updated
//! by SR1, DFP, BFGS, Hoshino, or Fletcher's switching rule (§4.5).

use faer::{Col, Mat};
use macros::{explicit_options, use_option};
use problemo::Problem;

use crate::{
    E, I, Solver, SolverHooks, SolverOptions, SolverState, Status,
    function::Function,
    linesearch::{Initializer, Search, search::LineSearchError},
};

/// Inverse-Hessian update formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuasiNewtonUpdate {
    Sr1,
    Dfp,
    Bfgs,
    /// Convex combination of DFP and BFGS, weighted by `phi`.
    Hoshino,
    /// Switches between DFP/SR1/BFGS based on `phi`.
    Fletcher,
}

fn dot(a: faer::ColRef<E>, b: faer::ColRef<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * b[i]).sum()
}

fn mat_vec(h: &Mat<E>, v: faer::ColRef<E>) -> Col<E> {
    let n = h.nrows();
    Col::from_fn(n, |i| (0..n).map(|j| h[(i, j)] * v[j]).sum())
}

/// Curvature guard below which an SR1 update is skipped rather than applied,
/// per the `|dg.(dx - H.dg)| >= r . ||dx|| . ||dx - H.dg||` test.
const SR1_GUARD: E = 1e-8;

#[explicit_options(name = SolverOptions)]
#[use_option(name = "qn_update", type_ = I, default = "2", description = "Index into the quasi-Newton update family (2 = BFGS).")]
#[use_option(name = "qn_phi", type_ = E, default = "0.5", description = "Mixing/switching parameter for Hoshino/Fletcher updates.")]
#[use_option(name = "qn_scale_h0", type_ = bool, default = "true", description = "Rescale H0 to (dx.dg)/(dg.dg) . I after the first update.")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
#[use_option(name = "solver_tolerance", type_ = E, default = "1e-6", description = "Gradient stationarity tolerance.")]
pub struct QuasiNewton<'a, S, Init> {
    f: &'a mut dyn Function,
    update: QuasiNewtonUpdate,
    search: S,
    initializer: Init,
    h: Mat<E>,
    prev_x: Option<Col<E>>,
    prev_g: Option<Col<E>>,
    scaled_h0: bool,
}

impl<'a, S: Search, Init: Initializer> QuasiNewton<'a, S, Init> {
    pub fn new(f: &'a mut dyn Function, update: QuasiNewtonUpdate, options: &SolverOptions) -> Self {
        let n = f.size();
        Self {
            options: options.into(),
            f,
            update,
            search: S::new(options),
            initializer: Init::new(options),
            h: Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 }),
            prev_x: None,
            prev_g: None,
            scaled_h0: false,
        }
    }

    fn update_hessian(&mut self, dx: &Col<E>, dg: &Col<E>) {
        let n = dx.nrows();
        if self.options.qn_scale_h0 && !self.scaled_h0 {
            let dxdg = dot(dx.as_ref(), dg.as_ref());
            let dgdg = dot(dg.as_ref(), dg.as_ref());
            if dgdg > E::EPSILON {
                let scale = dxdg / dgdg;
                self.h = Mat::from_fn(n, n, |i, j| if i == j { scale } else { 0.0 });
            }
            self.scaled_h0 = true;
        }

        let hdg = mat_vec(&self.h, dg.as_ref());
        let dxdg = dot(dx.as_ref(), dg.as_ref());

        match self.update {
            QuasiNewtonUpdate::Sr1 => self.apply_sr1(dx, dg, &hdg),
            QuasiNewtonUpdate::Dfp => self.apply_dfp(dx, &hdg, dxdg, dot(dg.as_ref(), hdg.as_ref())),
            QuasiNewtonUpdate::Bfgs => self.apply_bfgs(dx, &hdg, dxdg, dot(dg.as_ref(), hdg.as_ref())),
            QuasiNewtonUpdate::Hoshino => {
                let h_before = self.h.clone();
                self.apply_dfp(dx, &hdg, dxdg, dot(dg.as_ref(), hdg.as_ref()));
                let h_dfp = self.h.clone();
                self.h = h_before;
                self.apply_bfgs(dx, &hdg, dxdg, dot(dg.as_ref(), hdg.as_ref()));
                let phi = self.options.qn_phi;
                for i in 0..n {
                    for j in 0..n {
                        self.h[(i, j)] = phi * self.h[(i, j)] + (1.0 - phi) * h_dfp[(i, j)];
                    }
                }
            }
            QuasiNewtonUpdate::Fletcher => {
                if self.options.qn_phi < 1.0 / 3.0 {
                    self.apply_sr1(dx, dg, &hdg);
                } else if self.options.qn_phi < 2.0 / 3.0 {
                    self.apply_dfp(dx, &hdg, dxdg, dot(dg.as_ref(), hdg.as_ref()));
                } else {
                    self.apply_bfgs(dx, &hdg, dxdg, dot(dg.as_ref(), hdg.as_ref()));
                }
            }
        }
    }

    fn apply_sr1(&mut self, dx: &Col<E>, dg: &Col<E>, hdg: &Col<E>) {
        let n = dx.nrows();
        let diff = Col::from_fn(n, |i| dx[i] - hdg[i]);
        let denom = dot(dg.as_ref(), diff.as_ref());
        let guard = SR1_GUARD * (dot(dx.as_ref(), dx.as_ref())).sqrt() * (dot(diff.as_ref(), diff.as_ref())).sqrt();
        if denom.abs() < guard.max(E::EPSILON) {
            return;
        }
        for i in 0..n {
            for j in 0..n {
                self.h[(i, j)] += diff[i] * diff[j] / denom;
            }
        }
    }

    fn apply_dfp(&mut self, dx: &Col<E>, hdg: &Col<E>, dxdg: E, dgh_dg: E) {
        let n = dx.nrows();
        if dxdg.abs() < E::EPSILON || dgh_dg.abs() < E::EPSILON {
            return;
        }
        for i in 0..n {
            for j in 0..n {
                self.h[(i, j)] += dx[i] * dx[j] / dxdg - hdg[i] * hdg[j] / dgh_dg;
            }
        }
    }

    fn apply_bfgs(&mut self, dx: &Col<E>, hdg: &Col<E>, dxdg: E, dgh_dg: E) {
        let n = dx.nrows();
        if dxdg.abs() < E::EPSILON {
            return;
        }
        let factor = 1.0 + dgh_dg / dxdg;
        for i in 0..n {
            for j in 0..n {
                self.h[(i, j)] += (factor * dx[i] * dx[j] - hdg[i] * dx[j] - dx[i] * hdg[j]) / dxdg;
            }
        }
    }

    fn iterate(&mut self, state: &mut SolverState) -> Result<Status, Problem> {
        let n = state.x().nrows();
        let mut g = Col::<E>::zeros(n);
        let f0 = self.f.value_and_grad(state.x().as_ref(), &mut g);
        state.set_value(f0);
        state.set_gradient(g.clone());

        if !state.valid() {
            return Ok(Status::Failed);
        }

        let mut direction = mat_vec(&self.h, g.as_ref());
        for i in 0..n {
            direction[i] = -direction[i];
        }

        let mut gd0 = dot(g.as_ref(), direction.as_ref());
        if gd0 >= 0.0 {
            self.h = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
            direction = Col::from_fn(n, |i| -g[i]);
            gd0 = dot(g.as_ref(), direction.as_ref());
        }

        let t0 = self.initializer.initial_step(state, gd0);
        let step = match self.search.search(self.f, state, direction.as_ref(), t0, f0, gd0) {
            Ok(step) => step,
            Err(LineSearchError::Breakdown) => return Ok(Status::Failed),
            Err(e @ LineSearchError::NotADescentDirection) => return Err(e.into()),
        };

        let x_prev = state.x().clone();
        let new_x = Col::from_fn(n, |i| x_prev[i] + step.t * direction[i]);
        let mut g_new = Col::<E>::zeros(n);
        let f_new = self.f.value_and_grad(new_x.as_ref(), &mut g_new);

        let dx = Col::from_fn(n, |i| new_x[i] - x_prev[i]);
        let dg = Col::from_fn(n, |i| g_new[i] - g[i]);
        self.update_hessian(&dx, &dg);

        let delta_x = (0..n).map(|i| dx[i].powi(2)).sum::<E>().sqrt();
        state.push_history(f0 - f_new, delta_x);
        *state.x_mut() = new_x;
        state.set_value(f_new);
        state.set_gradient(g_new.clone());
        state.set_alphas(step.t, step.t);

        self.prev_x = Some(x_prev);
        self.prev_g = Some(g_new);

        Ok(Status::InProgress)
    }
}

impl<'a, S: Search, Init: Initializer> Solver for QuasiNewton<'a, S, Init> {
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, Problem> {
        hooks.terminator.initialize();
        let max_iterations = self.options.solver_max_iterations;

        for _ in 0..max_iterations {
            let status = self.iterate(state)?;
            state.advance();
            if status != Status::InProgress {
                return Ok(status);
            }

            hooks.callback.call(state);
            if let Some(status) = hooks.terminator.check(state) {
                return Ok(status);
            }

            let gnorm = state.g().map(|g| g.iter().fold(0.0, |a: E, v| a.max(v.abs()))).unwrap_or(E::INFINITY);
            if gnorm / state.f().unwrap_or(1.0).abs().max(1.0) <= self.options.solver_tolerance {
                return Ok(Status::Converged);
            }
        }
        Ok(Status::MaxIters)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        function::Rosenbrock,
        linesearch::{search::MoreThuente, initializer::UnitInitializer},
    };

    use super::*;

    #[test]
    fn bfgs_converges_on_rosenbrock() {
        let options = SolverOptions::new();
        let mut f = Rosenbrock::new();
        let mut state = SolverState::new(Col::from_fn(2, |i| if i == 0 { -1.2 } else { 1.0 }));
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::ConvergenceTerminator::new(1e-6)),
        );
        let mut solver = QuasiNewton::<MoreThuente, UnitInitializer>::new(&mut f, QuasiNewtonUpdate::Bfgs, &options);
        let status = solver.solve(&mut state, &mut hooks).unwrap();
        assert_eq!(status, Status::Converged);
        assert!((state.x()[0] - 1.0).abs() < 1e-3);
        assert!((state.x()[1] - 1.0).abs() < 1e-3);
    }
}
