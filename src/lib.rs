#![feature(const_option_ops)]

use std::any::Any;
use std::collections::VecDeque;

use dyn_clone::DynClone;
use faer::Col;
use macros::build_options;

pub type E = f64;
pub type I = usize;

pub mod bundle;
pub mod callback;
pub mod function;
pub mod linalg;
pub mod linesearch;
pub mod pool;
pub mod program;
pub mod solvers;
pub mod stats;
pub mod tensor;
pub mod terminators;

pub trait OptionTrait: Any + Sync + Send + DynClone {}
impl OptionTrait for &'static str {}
impl OptionTrait for String {}
impl OptionTrait for bool {}
impl OptionTrait for usize {}
impl OptionTrait for u8 {}
impl OptionTrait for u16 {}
impl OptionTrait for u32 {}
impl OptionTrait for u64 {}
impl OptionTrait for i8 {}
impl OptionTrait for i16 {}
impl OptionTrait for i32 {}
impl OptionTrait for i64 {}
impl OptionTrait for f32 {}
impl OptionTrait for f64 {}

impl Clone for Box<dyn OptionTrait> {
    fn clone(&self) -> Self {
        dyn_clone::clone_box(&**self)
    }
}

/// Terminal status of a solver run.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Status {
    #[default]
    /// The solver is still running.
    InProgress,
    /// The stopping test was satisfied.
    Converged,
    /// The problem was detected to be infeasible.
    Infeasible,
    /// The problem was detected to be unbounded.
    Unbounded,
    /// The evaluation/iteration budget was exhausted.
    MaxIters,
    /// A numerical failure occurred (non-finite value, line-search breakdown,
    /// singular KKT system).
    Failed,
    /// A callback requested early termination.
    Stopped,
    /// The solver was interrupted (e.g. SIGINT).
    Interrupted,
    /// The solver stopped due to a time limit.
    TimeLimit,
}

/// Source of the residual/KKT data a [`program::Program`] hands to the interior-point solver.
pub trait OptimizationProgram {
    fn compute_residual(&self, state: &SolverState) -> Residual;
}

/// Standard interface for iterative optimization algorithms: unconstrained
/// descent methods, the proximal bundle method, and the interior-point
/// program solver all implement this trait.
pub trait Solver {
    /// Runs the solver until convergence, a budget is exhausted, or a
    /// terminator/callback requests an early stop.
    fn solve(&mut self, state: &mut SolverState, hooks: &mut SolverHooks) -> Result<Status, problemo::Problem>;
}

/// Mutable iteration state shared by every solver family in this crate.
///
/// Unconstrained/bundle solvers (§4.5, §4.6) populate the `f`/`g`/`fcalls`/
/// `gcalls`/`history` fields; the interior-point program solver (§4.7)
/// additionally populates `s`/`lambda`/`nu`/`residual`/`sigma`/`mu`. Fields
/// irrelevant to a given solver family are left `None`, mirroring how the
/// teacher's own solver state overloads one struct across NLP- and
/// IPM-specific fields rather than splitting into parallel hierarchies.
#[derive(Debug, Clone)]
#[allow(non_snake_case, unused)]
pub struct SolverState {
    status: Status,
    nit: usize,

    x: Col<E>,

    // Unconstrained / bundle family.
    f: Option<E>,
    g: Option<Col<E>>,
    fcalls: usize,
    gcalls: usize,
    history: VecDeque<(E, E)>,

    // Interior-point program family.
    s: Option<Col<E>>,
    lambda: Option<Col<E>>,
    nu: Option<Col<E>>,
    residual: Option<Residual>,
    alpha_primal: Option<E>,
    alpha_dual: Option<E>,
    sigma: Option<E>,
    mu: Option<E>,
}

const HISTORY_CAPACITY: usize = 16;

impl SolverState {
    /// Builds a state for an unconstrained/bundle solver seeded with `x0`.
    pub fn new(x0: Col<E>) -> Self {
        Self {
            status: Status::InProgress,
            nit: 0,
            x: x0,
            f: None,
            g: None,
            fcalls: 0,
            gcalls: 0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            s: None,
            lambda: None,
            nu: None,
            residual: None,
            alpha_primal: None,
            alpha_dual: None,
            sigma: None,
            mu: None,
        }
    }

    /// Builds a state for the interior-point program solver.
    pub fn new_program(x0: Col<E>, s0: Col<E>, lambda0: Col<E>, nu0: Col<E>) -> Self {
        let mut state = Self::new(x0);
        state.s = Some(s0);
        state.lambda = Some(lambda0);
        state.nu = Some(nu0);
        state.alpha_primal = Some(E::from(1.));
        state.alpha_dual = Some(E::from(1.));
        state
    }

    pub fn get_status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn iteration(&self) -> usize {
        self.nit
    }

    pub fn advance(&mut self) {
        self.nit += 1;
    }

    pub fn x(&self) -> &Col<E> {
        &self.x
    }

    pub fn x_mut(&mut self) -> &mut Col<E> {
        &mut self.x
    }

    pub fn f(&self) -> Option<E> {
        self.f
    }

    pub fn g(&self) -> Option<&Col<E>> {
        self.g.as_ref()
    }

    pub fn set_value(&mut self, f: E) {
        self.f = Some(f);
        self.fcalls += 1;
    }

    pub fn set_gradient(&mut self, g: Col<E>) {
        self.g = Some(g);
        self.gcalls += 1;
    }

    pub fn evals(&self) -> usize {
        self.fcalls + self.gcalls
    }

    /// Pushes an `(Δf, Δx)` sample, evicting the oldest once at capacity.
    pub fn push_history(&mut self, delta_f: E, delta_x: E) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back((delta_f, delta_x));
    }

    pub fn history(&self) -> &VecDeque<(E, E)> {
        &self.history
    }

    /// True when `f` and `g` (when present) are finite.
    pub fn valid(&self) -> bool {
        let f_ok = self.f.map(|f| f.is_finite()).unwrap_or(true);
        let g_ok = self.g.as_ref().map(|g| g.iter().all(|v| v.is_finite())).unwrap_or(true);
        f_ok && g_ok
    }

    pub fn s(&self) -> &Col<E> {
        self.s.as_ref().expect("program state accessed on a non-program solver state")
    }

    pub fn s_mut(&mut self) -> &mut Col<E> {
        self.s.as_mut().expect("program state accessed on a non-program solver state")
    }

    pub fn lambda(&self) -> &Col<E> {
        self.lambda.as_ref().expect("program state accessed on a non-program solver state")
    }

    pub fn lambda_mut(&mut self) -> &mut Col<E> {
        self.lambda.as_mut().expect("program state accessed on a non-program solver state")
    }

    pub fn nu(&self) -> &Col<E> {
        self.nu.as_ref().expect("program state accessed on a non-program solver state")
    }

    pub fn nu_mut(&mut self) -> &mut Col<E> {
        self.nu.as_mut().expect("program state accessed on a non-program solver state")
    }

    pub fn residual(&self) -> Option<&Residual> {
        self.residual.as_ref()
    }

    pub fn set_residual(&mut self, residual: Residual) {
        self.residual = Some(residual);
    }

    pub fn mu(&self) -> Option<E> {
        self.mu
    }

    pub fn set_mu(&mut self, mu: E) {
        self.mu = Some(mu);
    }

    pub fn sigma(&self) -> Option<E> {
        self.sigma
    }

    pub fn set_sigma(&mut self, sigma: E) {
        self.sigma = Some(sigma);
    }

    pub fn alpha_primal(&self) -> E {
        self.alpha_primal.unwrap_or(E::from(1.))
    }

    pub fn alpha_dual(&self) -> E {
        self.alpha_dual.unwrap_or(E::from(1.))
    }

    pub fn set_alphas(&mut self, primal: E, dual: E) {
        self.alpha_primal = Some(primal);
        self.alpha_dual = Some(dual);
    }
}

/// KKT residual block for the interior-point program solver.
#[derive(Debug, Clone)]
pub struct Residual {
    /// `Qx + c + Gᵀλ + Aᵀν` (stationarity of the Lagrangian).
    dual_feasibility: Col<E>,
    /// `Ax − b` (equality feasibility).
    primal_feasibility: Col<E>,
    /// `Gx + s − h` (inequality/slack feasibility).
    slack_feasibility: Col<E>,
    /// `s ⊙ λ` (complementary slackness).
    complementarity: Col<E>,
}

impl Residual {
    pub fn new(
        dual_feasibility: Col<E>,
        primal_feasibility: Col<E>,
        slack_feasibility: Col<E>,
        complementarity: Col<E>,
    ) -> Self {
        Self {
            dual_feasibility,
            primal_feasibility,
            slack_feasibility,
            complementarity,
        }
    }

    pub fn dual_feasibility(&self) -> &Col<E> {
        &self.dual_feasibility
    }

    pub fn primal_feasibility(&self) -> &Col<E> {
        &self.primal_feasibility
    }

    pub fn slack_feasibility(&self) -> &Col<E> {
        &self.slack_feasibility
    }

    pub fn complementarity(&self) -> &Col<E> {
        &self.complementarity
    }

    fn inf_norm(col: &Col<E>) -> E {
        col.iter().fold(E::from(0.), |acc, v| acc.max(v.abs()))
    }

    pub fn primal_inf_norm(&self) -> E {
        Self::inf_norm(&self.primal_feasibility).max(Self::inf_norm(&self.slack_feasibility))
    }

    pub fn dual_inf_norm(&self) -> E {
        Self::inf_norm(&self.dual_feasibility)
    }
}

/// Bundles the per-iteration callback and the stopping terminator.
pub struct SolverHooks {
    pub callback: Box<dyn crate::callback::Callback>,
    pub terminator: Box<dyn crate::terminators::Terminator>,
}

impl SolverHooks {
    pub fn new(callback: Box<dyn crate::callback::Callback>, terminator: Box<dyn crate::terminators::Terminator>) -> Self {
        Self { callback, terminator }
    }
}

build_options!(name = SolverOptions, registry_name = OPTION_REGISTRY);

/// The `build_options!` macro (see `macros::options`) always names its
/// generated struct `Options`, independent of the `name = ...` it is given;
/// this alias restores the name every solver module actually references.
pub type SolverOptions = Options;
