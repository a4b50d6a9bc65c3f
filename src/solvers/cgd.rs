//! Nonlinear conjugate-gradient solver with nine `β` formulas and a
//! restart-to-steepest-descent safeguard (§4.5).

use faer::Col;
use macros::{explicit_options, use_option};
use problemo::Problem;

use crate::{
    E, I, Solver, SolverHooks, SolverOptions, SolverState, Status,
    function::Function,
    linesearch::{Initializer, Search, search::LineSearchError},
};

/// The `β_k` formula applied at each restart-eligible iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetaFormula {
    HestenesStiefelPlus,
    FletcherReeves,
    PolakRibierePlus,
    ConjugateDescent,
    LiuStoreyPlus,
    DaiYuan,
    NPlus,
    DaiYuanHestenesStiefel,
    FletcherReevesPolakRibiere,
}

fn dot(a: faer::ColRef<E>, b: faer::ColRef<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * b[i]).sum()
}

impl BetaFormula {
    /// Computes `β_k` from the previous/current gradient and direction.
    fn beta(&self, g_prev: faer::ColRef<E>, g: faer::ColRef<E>, d_prev: faer::ColRef<E>) -> E {
        let gg = dot(g, g);
        let gg_prev = dot(g_prev, g_prev);
        let y = Col::from_fn(g.nrows(), |i| g[i] - g_prev[i]);
        let gy = dot(g.as_ref(), y.as_ref());
        let dy = dot(d_prev, y.as_ref());
        let dg_prev = dot(d_prev, g_prev);

        match self {
            BetaFormula::FletcherReeves => gg / gg_prev.max(E::EPSILON),
            BetaFormula::PolakRibierePlus => (gy / gg_prev.max(E::EPSILON)).max(0.0),
            BetaFormula::HestenesStiefelPlus => (gy / dy.abs().max(E::EPSILON)).max(0.0),
            BetaFormula::ConjugateDescent => -gg / dg_prev.min(-E::EPSILON),
            BetaFormula::LiuStoreyPlus => (-gy / dg_prev.min(-E::EPSILON)).max(0.0),
            BetaFormula::DaiYuan => gg / dy.abs().max(E::EPSILON),
            BetaFormula::NPlus => {
                let y_norm_sq = dot(y.as_ref(), y.as_ref());
                let beta_n = (gy - 2.0 * y_norm_sq * dg_prev / dy.abs().max(E::EPSILON)) / dy.abs().max(E::EPSILON);
                beta_n.max(0.0)
            }
            BetaFormula::DaiYuanHestenesStiefel => {
                let hs = gy / dy.abs().max(E::EPSILON);
                let dy_b = gg / dy.abs().max(E::EPSILON);
                hs.max(0.0).min(dy_b)
            }
            BetaFormula::FletcherReevesPolakRibiere => {
                let fr = gg / gg_prev.max(E::EPSILON);
                let pr = gy / gg_prev.max(E::EPSILON);
                pr.clamp(-fr, fr)
            }
        }
    }
}

/// Nonlinear conjugate-gradient method: restarts to steepest descent when
/// the direction fails the descent test or consecutive gradients lose
/// near-orthogonality.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "cgd_beta_formula", type_ = I, default = "0", description = "Index into the CGD beta-formula family (0 = Fletcher-Reeves).")]
#[use_option(name = "cgd_orthotest", type_ = E, default = "0.1", description = "Restart threshold: |g_k . g_{k-1}| >= orthotest * g_k . g_k triggers a restart.")]
#[use_option(name = "solver_max_iterations", type_ = I, default = "1000", description = "Maximum number of solver iterations.")]
#[use_option(name = "solver_tolerance", type_ = E, default = "1e-6", description = "Gradient stationarity tolerance.")]
pub struct ConjugateGradient<'a, S, Init> {
    f: &'a mut dyn Function,
    beta_formula: BetaFormula,
    search: S,
    initializer: Init,
    direction: Option<Col<E>>,
    prev_g: Option<Col<E>>,
}

impl<'a, S: Search, Init: Initializer> ConjugateGradient<'a, S, Init> {
    pub fn new(f: &'a mut dyn Function, beta_formula: BetaFormula, options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
            f,
            beta_formula,
            search: S::new(options),
            initializer: Init::new(options),
            direction: None,
            prev_g: None,
        }
    }

    fn direction_for(&mut self, g: &Col<E>) -> Col<E> {
        let n = g.nrows();
        let steepest = Col::from_fn(n, |i| -g[i]);

        let (d_prev, g_prev) = match (&self.direction, &self.prev_g) {
            (Some(d), Some(gp)) => (d, gp),
            _ => return steepest,
        };

        let orthotest = self.options.cgd_orthotest;
        let gg = dot(g.as_ref(), g.as_ref());
        if (dot(g.as_ref(), g_prev.as_ref())).abs() >= orthotest * gg {
            return steepest;
        }

        let beta = self.beta_formula.beta(g_prev.as_ref(), g.as_ref(), d_prev.as_ref());
        let candidate = Col::from_fn(n, |i| -g[i] + beta * d_prev[i]);

        if dot(candidate.as_ref(), g.as_ref()) < 0.0 {
            candidate
        } else {
            steepest
        }
    }

    fn iterate(&mut self, state: &mut SolverState) -> Result<Status, Problem> {
        let mut g = Col::<E>::zeros(state.x().nrows());
        let f0 = self.f.value_and_grad(state.x().as_ref(), &mut g);
        state.set_value(f0);
        state.set_gradient(g.clone());

        if !state.valid() {
            return Ok(Status::Failed);
        }

        let direction = self.direction_for(&g);
        let gd0 = dot(g.as_ref(), direction.as_ref());
        let t0 = self.initializer.initial_step(state, gd0);

        let step = match self.search.search(self.f, state, direction.as_ref(), t0, f0, gd0) {
            Ok(step) => step,
            Err(LineSearchError::Breakdown) => return Ok(Status::Failed),
            Err(e @ LineSearchError::NotADescentDirection) => return Err(e.into()),
        };
        let x_prev = state.x().clone();
        let new_x = Col::from_fn(direction.nrows(), |i| x_prev[i] + step.t * direction[i]);

        let delta_x = (0..new_x.nrows()).map(|i| (new_x[i] - x_prev[i]).powi(2)).sum::<E>().sqrt();
        state.push_history(f0 - step.f, delta_x);
        *state.x_mut() = new_x;
        state.set_alphas(step.t, step.t);

        self.direction = Some(direction);
        self.prev_g = Some(g);

        Ok(Status::InProgress)
    }
}

impl<'a, S: Search, Init: Initializer> Solver for ConjugateGradient<'a, S, Init> {
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
    use rstest::rstest;
    use rstest_reuse::{apply, template};

    use crate::{
        function::Sphere,
        linesearch::{initializer::UnitInitializer, search::Backtracking},
    };

    use super::*;

    #[test]
    fn converges_on_sphere() {
        let options = SolverOptions::new();
        let mut f = Sphere::new(3);
        let mut state = SolverState::new(Col::from_fn(3, |i| (i as E + 1.0)));
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::ConvergenceTerminator::new(1e-8)),
        );
        let mut solver = ConjugateGradient::<Backtracking, UnitInitializer>::new(&mut f, BetaFormula::FletcherReeves, &options);
        let status = solver.solve(&mut state, &mut hooks).unwrap();
        assert_eq!(status, Status::Converged);
        for i in 0..3 {
            assert!(state.x()[i].abs() < 1e-3);
        }
    }

    #[template]
    #[rstest]
    fn beta_formulas(
        #[values(
            BetaFormula::HestenesStiefelPlus,
            BetaFormula::FletcherReeves,
            BetaFormula::PolakRibierePlus,
            BetaFormula::ConjugateDescent,
            BetaFormula::LiuStoreyPlus,
            BetaFormula::DaiYuan,
            BetaFormula::NPlus,
            BetaFormula::DaiYuanHestenesStiefel,
            BetaFormula::FletcherReevesPolakRibiere
        )]
        beta_formula: BetaFormula,
    ) {
    }

    #[apply(beta_formulas)]
    fn every_beta_formula_converges_on_sphere(beta_formula: BetaFormula) {
        let options = SolverOptions::new();
        let mut f = Sphere::new(3);
        let mut state = SolverState::new(Col::from_fn(3, |i| (i as E + 1.0)));
        let mut hooks = SolverHooks::new(
            Box::new(crate::callback::NoOpCallback::new(&options)),
            Box::new(crate::terminators::ConvergenceTerminator::new(1e-8)),
        );
        let mut solver = ConjugateGradient::<Backtracking, UnitInitializer>::new(&mut f, beta_formula, &options);
        let status = solver.solve(&mut state, &mut hooks).unwrap();
        assert_eq!(status, Status::Converged);
    }
}
