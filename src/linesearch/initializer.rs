//! Step initializers: given the current state and search direction, propose
//! the trial step `t₀` handed to a [`super::Search`].

use macros::{explicit_options, use_option};

use crate::{E, SolverOptions, SolverState};

/// Strategy for seeding the initial trial step of a line search.
pub trait Initializer {
    fn new(options: &SolverOptions) -> Self
    where
        Self: Sized;

    /// Proposes `t₀` given the current state and the unit-normalized (or
    /// raw) search direction's directional derivative `gd0 = ∇f₀·d`.
    fn initial_step(&mut self, state: &SolverState, gd0: E) -> E;
}

/// Always proposes `t₀ = 1`, the standard choice for Newton-like directions.
#[explicit_options(name = SolverOptions)]
pub struct UnitInitializer {}

impl Initializer for UnitInitializer {
    fn new(options: &SolverOptions) -> Self {
        Self { options: options.into() }
    }

    fn initial_step(&mut self, _state: &SolverState, _gd0: E) -> E {
        1.0
    }
}

/// Extrapolates from the previous accepted step and the ratio of successive
/// directional derivatives: `t₀ = t_{k-1}·gd_{k-1}/gd_k`, falling back to `1`
/// on the first iteration.
#[explicit_options(name = SolverOptions)]
pub struct LinearInitializer {
    previous_step: E,
    previous_gd: Option<E>,
}

impl Initializer for LinearInitializer {
    fn new(options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
            previous_step: 1.0,
            previous_gd: None,
        }
    }

    fn initial_step(&mut self, _state: &SolverState, gd0: E) -> E {
        let t0 = match self.previous_gd {
            Some(prev_gd) if gd0 != 0.0 => (self.previous_step * prev_gd / gd0).abs(),
            _ => 1.0,
        };
        self.previous_gd = Some(gd0);
        self.previous_step = t0;
        t0
    }
}

/// Quadratic interpolation through the last two function values along the
/// search direction, per the secant-style rule `t₀ = 2(f_k − f_{k-1})/gd_k`.
#[explicit_options(name = SolverOptions)]
pub struct QuadraticInitializer {
    previous_f: Option<E>,
}

impl Initializer for QuadraticInitializer {
    fn new(options: &SolverOptions) -> Self {
        Self {
            options: options.into(),
            previous_f: None,
        }
    }

    fn initial_step(&mut self, state: &SolverState, gd0: E) -> E {
        let f0 = state.f().unwrap_or(0.0);
        let t0 = match self.previous_f {
            Some(prev_f) if gd0 != 0.0 => {
                let candidate = 2.0 * (f0 - prev_f) / gd0;
                if candidate > 0.0 && candidate.is_finite() { candidate.min(1.0) } else { 1.0 }
            }
            _ => 1.0,
        };
        self.previous_f = Some(f0);
        t0
    }
}

/// CG-DESCENT's three-phase initial-step rule, parameterized by
/// `(φ₀, φ₁, φ₂)`. Carries its own decaying `ε` (seeded from
/// `cgdescent_epsilon`, geometrically halved on every call) rather than
/// reading it from the outer solver state.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "cgdescent_phi0", type_ = E, default = "0.01", description = "CG-DESCENT initializer phase-0 ratio.")]
#[use_option(name = "cgdescent_phi1", type_ = E, default = "0.1", description = "CG-DESCENT initializer phase-1 ratio.")]
#[use_option(name = "cgdescent_phi2", type_ = E, default = "2.0", description = "CG-DESCENT initializer phase-2 expansion factor.")]
#[use_option(name = "cgdescent_epsilon", type_ = E, default = "1e-6", description = "Seed value for the CG-DESCENT initializer's decaying epsilon.")]
pub struct CgDescentInitializer {
    epsilon: E,
    previous_step: Option<E>,
    previous_x_norm: Option<E>,
}

impl Initializer for CgDescentInitializer {
    fn new(options: &SolverOptions) -> Self {
        let epsilon = options.get_option::<E>("cgdescent_epsilon").unwrap_or(1e-6);
        Self {
            options: options.into(),
            epsilon,
            previous_step: None,
            previous_x_norm: None,
        }
    }

    fn initial_step(&mut self, state: &SolverState, gd0: E) -> E {
        let x_norm = (0..state.x().nrows()).map(|i| state.x()[i].powi(2)).sum::<E>().sqrt();
        let f0 = state.f().unwrap_or(0.0).abs();

        let t0 = if x_norm > 0.0 {
            // Phase 0: scale relative to the size of the current iterate.
            self.options.cgdescent_phi0 * x_norm / gd0.abs().max(E::EPSILON)
        } else if f0 > 0.0 {
            // Phase 1: scale relative to the objective value.
            self.options.cgdescent_phi1 * f0 / gd0.abs().max(E::EPSILON)
        } else {
            // Phase 2: no useful scale observed yet, expand from the last step.
            self.previous_step.unwrap_or(1.0) * self.options.cgdescent_phi2
        };

        self.epsilon *= 0.5;
        self.previous_step = Some(t0);
        self.previous_x_norm = Some(x_norm);
        t0.max(E::EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_initializer_always_returns_one() {
        let options = SolverOptions::new();
        let mut init = UnitInitializer::new(&options);
        let state = SolverState::new(faer::Col::zeros(2));
        assert_eq!(init.initial_step(&state, -1.0), 1.0);
    }

    #[test]
    fn cgdescent_epsilon_decays_geometrically() {
        let options = SolverOptions::new();
        let mut init = CgDescentInitializer::new(&options);
        let state = SolverState::new(faer::Col::zeros(2));
        let start = init.epsilon;
        init.initial_step(&state, -1.0);
        init.initial_step(&state, -1.0);
        assert!((init.epsilon - start / 4.0).abs() < 1e-15);
    }
}
