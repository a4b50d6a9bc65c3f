use macros::build_option_enum;

use crate::{SolverOptions, SolverState};

/// Hook invoked once per solver iteration for logging, monitoring, or early stopping.
pub trait Callback {
    /// Creates a new callback from solver options.
    fn new(options: &SolverOptions) -> Self
    where
        Self: Sized;

    /// Called at the end of each iteration with the current solver state.
    fn call(&mut self, state: &SolverState);
}

/// A callback that does nothing. Use when no per-iteration output is needed.
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn new(_options: &SolverOptions) -> Self {
        Self {}
    }

    fn call(&mut self, _state: &SolverState) {
        // Do nothing
    }
}

/// Prints the current objective value and infeasibility measures to stdout
/// every iteration.
pub struct ConvergenceOutput {}

impl Callback for ConvergenceOutput {
    fn new(_options: &SolverOptions) -> Self {
        Self {}
    }

    fn call(&mut self, state: &SolverState) {
        let f = state.f().unwrap_or(f64::NAN);
        let gnorm = state
            .g()
            .map(|g| g.iter().fold(0f64, |a, v| a.max(v.abs())))
            .unwrap_or(f64::NAN);
        let (pinf, dinf) = state
            .residual()
            .map(|r| (r.primal_inf_norm(), r.dual_inf_norm()))
            .unwrap_or((f64::NAN, f64::NAN));
        println!(
            "| {:4}: | f={:<12.5e} | |g|={:<8.2e} | p_inf={:<8.2e} | d_inf={:<8.2e} | evals={:<6} |",
            state.iteration(),
            f,
            gnorm,
            pinf,
            dinf,
            state.evals(),
        );
    }
}

build_option_enum!(
    trait_ = Callback,
    name = "Callbacks",
    variants = (NoOpCallback, ConvergenceOutput),
    new_arguments = (&SolverOptions,),
    doc_header = "An enum representing the available per-iteration callbacks. Each variant corresponds to a specific callback strategy."
);
