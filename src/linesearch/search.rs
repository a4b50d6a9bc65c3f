//! 1-D line searches: given a trial step `t₀`, find `t` satisfying the
//! search's acceptance condition.

use derive_more::{Display, Error};
use macros::{explicit_options, use_option};

use crate::{
    E, SolverOptions, SolverState,
    function::Function,
    linesearch::{Step, approximate_wolfe, armijo, cubic_interpolate, eval_step, strong_wolfe, weak_wolfe},
};

/// Error raised when a 1-D search exhausts its iteration budget without
/// satisfying its acceptance condition.
#[derive(Debug, Display, Error, PartialEq)]
pub enum LineSearchError {
    #[display("line search failed to satisfy its acceptance condition within the iteration budget")]
    Breakdown,
    #[display("line search direction is not a descent direction (gd0 >= 0)")]
    NotADescentDirection,
}

/// Strategy for refining (or accepting) an initial trial step into one
/// satisfying an Armijo/Wolfe-family condition.
pub trait Search {
    fn new(options: &SolverOptions) -> Self
    where
        Self: Sized;

    /// Searches along `direction` from `state.x()`, starting at `t0`.
    /// `f0`/`gd0` are the objective value and directional derivative at `t = 0`.
    fn search(
        &mut self,
        f: &mut dyn Function,
        state: &SolverState,
        direction: faer::ColRef<E>,
        t0: E,
        f0: E,
        gd0: E,
    ) -> Result<Step, LineSearchError>;
}

fn check_descent(gd0: E) -> Result<(), LineSearchError> {
    if gd0 >= 0.0 {
        Err(LineSearchError::NotADescentDirection)
    } else {
        Ok(())
    }
}

/// Backtracking (Armijo-only) search: halves `t` until the sufficient
/// decrease condition holds.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "linesearch_c1", type_ = E, default = "1e-4", description = "Armijo sufficient-decrease constant.")]
#[use_option(name = "linesearch_max_iterations", type_ = crate::I, default = "50", description = "Maximum number of step halvings/expansions a line search may perform.")]
pub struct Backtracking {}

impl Search for Backtracking {
    fn new(options: &SolverOptions) -> Self {
        Self { options: options.into() }
    }

    fn search(
        &mut self,
        f: &mut dyn Function,
        state: &SolverState,
        direction: faer::ColRef<E>,
        t0: E,
        f0: E,
        gd0: E,
    ) -> Result<Step, LineSearchError> {
        check_descent(gd0)?;
        let mut t = t0;
        for _ in 0..self.options.linesearch_max_iterations {
            let step = eval_step(f, state.x().as_ref(), direction, t);
            if armijo(&step, f0, gd0, self.options.linesearch_c1) {
                return Ok(step);
            }
            t *= 0.5;
        }
        Err(LineSearchError::Breakdown)
    }
}

/// Lemaréchal weak-Wolfe search: brackets an interval satisfying Armijo,
/// then bisects/expands until the curvature condition also holds.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "linesearch_c1", type_ = E, default = "1e-4", description = "Armijo sufficient-decrease constant.")]
#[use_option(name = "linesearch_c2", type_ = E, default = "0.9", description = "Wolfe curvature constant.")]
#[use_option(name = "linesearch_max_iterations", type_ = crate::I, default = "50", description = "Maximum number of step halvings/expansions a line search may perform.")]
pub struct Lemarechal {}

impl Search for Lemarechal {
    fn new(options: &SolverOptions) -> Self {
        Self { options: options.into() }
    }

    fn search(
        &mut self,
        f: &mut dyn Function,
        state: &SolverState,
        direction: faer::ColRef<E>,
        t0: E,
        f0: E,
        gd0: E,
    ) -> Result<Step, LineSearchError> {
        check_descent(gd0)?;
        let (c1, c2) = (self.options.linesearch_c1, self.options.linesearch_c2);
        let mut lo = 0.0;
        let mut hi = E::INFINITY;
        let mut t = t0;

        for _ in 0..self.options.linesearch_max_iterations {
            let step = eval_step(f, state.x().as_ref(), direction, t);
            if !armijo(&step, f0, gd0, c1) {
                hi = t;
                t = 0.5 * (lo + hi);
            } else if !weak_wolfe(&step, gd0, c2) {
                lo = t;
                t = if hi.is_finite() { 0.5 * (lo + hi) } else { 2.0 * t };
            } else {
                return Ok(step);
            }
        }
        Err(LineSearchError::Breakdown)
    }
}

/// Fletcher's strong-Wolfe search: identical bracketing to [`Lemarechal`]
/// but requires the curvature condition to hold in absolute value.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "linesearch_c1", type_ = E, default = "1e-4", description = "Armijo sufficient-decrease constant.")]
#[use_option(name = "linesearch_c2", type_ = E, default = "0.9", description = "Wolfe curvature constant.")]
#[use_option(name = "linesearch_max_iterations", type_ = crate::I, default = "50", description = "Maximum number of step halvings/expansions a line search may perform.")]
pub struct Fletcher {}

impl Search for Fletcher {
    fn new(options: &SolverOptions) -> Self {
        Self { options: options.into() }
    }

    fn search(
        &mut self,
        f: &mut dyn Function,
        state: &SolverState,
        direction: faer::ColRef<E>,
        t0: E,
        f0: E,
        gd0: E,
    ) -> Result<Step, LineSearchError> {
        check_descent(gd0)?;
        let (c1, c2) = (self.options.linesearch_c1, self.options.linesearch_c2);
        let mut lo = 0.0;
        let mut hi = E::INFINITY;
        let mut t = t0;

        for _ in 0..self.options.linesearch_max_iterations {
            let step = eval_step(f, state.x().as_ref(), direction, t);
            if !armijo(&step, f0, gd0, c1) {
                hi = t;
                t = 0.5 * (lo + hi);
            } else if !strong_wolfe(&step, gd0, c2) {
                if step.gd > 0.0 {
                    hi = t;
                } else {
                    lo = t;
                }
                t = if hi.is_finite() { 0.5 * (lo + hi) } else { 2.0 * t };
            } else {
                return Ok(step);
            }
        }
        Err(LineSearchError::Breakdown)
    }
}

/// Moré–Thuente strong-Wolfe search via `dcstep`-style safeguarded cubic
/// interpolation within a shrinking bracket `[stx, sty]`.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "linesearch_c1", type_ = E, default = "1e-4", description = "Armijo sufficient-decrease constant.")]
#[use_option(name = "linesearch_c2", type_ = E, default = "0.9", description = "Wolfe curvature constant.")]
#[use_option(name = "linesearch_max_iterations", type_ = crate::I, default = "50", description = "Maximum number of step halvings/expansions a line search may perform.")]
pub struct MoreThuente {}

impl Search for MoreThuente {
    fn new(options: &SolverOptions) -> Self {
        Self { options: options.into() }
    }

    fn search(
        &mut self,
        f: &mut dyn Function,
        state: &SolverState,
        direction: faer::ColRef<E>,
        t0: E,
        f0: E,
        gd0: E,
    ) -> Result<Step, LineSearchError> {
        check_descent(gd0)?;
        let (c1, c2) = (self.options.linesearch_c1, self.options.linesearch_c2);

        // Bracket endpoint stx starts at t=0 with the known (f0, gd0).
        let mut stx = Step { t: 0.0, f: f0, gd: gd0 };
        let mut sty = stx;
        let mut t = t0;

        for _ in 0..self.options.linesearch_max_iterations {
            let step = eval_step(f, state.x().as_ref(), direction, t);

            if !armijo(&step, f0, gd0, c1) || step.f >= stx.f {
                sty = step;
            } else {
                if strong_wolfe(&step, gd0, c2) {
                    return Ok(step);
                }
                if step.gd * (stx.t - t) >= 0.0 {
                    sty = stx;
                }
                stx = step;
            }

            t = cubic_interpolate(stx.t, stx.f, stx.gd, sty.t, sty.f, sty.gd);
            if !t.is_finite() || (t - stx.t).abs() < E::EPSILON {
                break;
            }
        }
        Err(LineSearchError::Breakdown)
    }
}

/// CG-DESCENT's search: accepts ordinary Wolfe while `f` is well above its
/// starting value, switches to the approximate-Wolfe condition once `f` has
/// dropped within `ε` of `f0`, per the "Wolfe or approximate-Wolfe" rule.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "linesearch_c1", type_ = E, default = "0.1", description = "Approximate-Wolfe sufficient-decrease constant.")]
#[use_option(name = "linesearch_c2", type_ = E, default = "0.9", description = "Wolfe curvature constant.")]
#[use_option(name = "cgdescent_epsilon", type_ = E, default = "1e-6", description = "Seed value for the CG-DESCENT initializer's decaying epsilon.")]
#[use_option(name = "cgdescent_rho", type_ = E, default = "5.0", description = "Bracket expansion factor for the CG-DESCENT search.")]
#[use_option(name = "linesearch_max_iterations", type_ = crate::I, default = "50", description = "Maximum number of step halvings/expansions a line search may perform.")]
pub struct CgDescentSearch {}

impl Search for CgDescentSearch {
    fn new(options: &SolverOptions) -> Self {
        Self { options: options.into() }
    }

    fn search(
        &mut self,
        f: &mut dyn Function,
        state: &SolverState,
        direction: faer::ColRef<E>,
        t0: E,
        f0: E,
        gd0: E,
    ) -> Result<Step, LineSearchError> {
        check_descent(gd0)?;
        let (c1, c2) = (self.options.linesearch_c1, self.options.linesearch_c2);
        let epsilon = self.options.cgdescent_epsilon * (1.0 + f0.abs());

        // Expand until a bracket `[lo, hi]` containing an acceptable point is found.
        let mut lo = Step { t: 0.0, f: f0, gd: gd0 };
        let mut hi = eval_step(f, state.x().as_ref(), direction, t0);
        let mut t = t0;
        for _ in 0..self.options.linesearch_max_iterations {
            if hi.f <= f0 + epsilon && approximate_wolfe(&hi, gd0, c1, c2) {
                return Ok(hi);
            }
            if hi.f > f0 + epsilon || hi.gd >= 0.0 {
                break;
            }
            t *= self.options.cgdescent_rho;
            lo = hi;
            hi = eval_step(f, state.x().as_ref(), direction, t);
        }

        // Secant refinement within [lo, hi].
        for _ in 0..self.options.linesearch_max_iterations {
            let t_mid = cubic_interpolate(lo.t, lo.f, lo.gd, hi.t, hi.f, hi.gd);
            let t_mid = if t_mid.is_finite() && t_mid > lo.t.min(hi.t) && t_mid < lo.t.max(hi.t) {
                t_mid
            } else {
                0.5 * (lo.t + hi.t)
            };
            let mid = eval_step(f, state.x().as_ref(), direction, t_mid);

            if mid.f <= f0 + epsilon && approximate_wolfe(&mid, gd0, c1, c2) {
                return Ok(mid);
            }
            if mid.f > f0 + epsilon || mid.gd >= 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
            if (hi.t - lo.t).abs() < E::EPSILON {
                break;
            }
        }
        Err(LineSearchError::Breakdown)
    }
}

#[cfg(test)]
mod tests {
    use faer::Col;

    use super::*;
    use crate::function::Sphere;

    fn descent_setup(n: usize) -> (Sphere, faer::Col<E>, faer::Col<E>, E, E) {
        let f = Sphere::new(n);
        let x = Col::from_fn(n, |i| (i as E + 1.0));
        let direction = Col::from_fn(n, |i| -x[i]);
        let gd0: E = (0..n).map(|i| 2.0 * x[i] * direction[i]).sum();
        let f0 = (0..n).map(|i| x[i] * x[i]).sum();
        (f, x, direction, f0, gd0)
    }

    #[test]
    fn backtracking_satisfies_armijo_on_sphere() {
        let (mut f, x, direction, f0, gd0) = descent_setup(3);
        let options = SolverOptions::new();
        let mut search = Backtracking::new(&options);
        let state = SolverState::new(x);
        let step = search.search(&mut f, &state, direction.as_ref(), 1.0, f0, gd0).unwrap();
        assert!(armijo(&step, f0, gd0, options.get_option::<E>("linesearch_c1").unwrap()));
    }

    #[test]
    fn lemarechal_satisfies_weak_wolfe_on_sphere() {
        let (mut f, x, direction, f0, gd0) = descent_setup(3);
        let options = SolverOptions::new();
        let mut search = Lemarechal::new(&options);
        let state = SolverState::new(x);
        let step = search.search(&mut f, &state, direction.as_ref(), 1.0, f0, gd0).unwrap();
        assert!(weak_wolfe(&step, gd0, options.get_option::<E>("linesearch_c2").unwrap()));
    }

    #[test]
    fn more_thuente_satisfies_strong_wolfe_on_sphere() {
        let (mut f, x, direction, f0, gd0) = descent_setup(4);
        let options = SolverOptions::new();
        let mut search = MoreThuente::new(&options);
        let state = SolverState::new(x);
        let step = search.search(&mut f, &state, direction.as_ref(), 1.0, f0, gd0).unwrap();
        assert!(strong_wolfe(&step, gd0, options.get_option::<E>("linesearch_c2").unwrap()));
    }

    #[test]
    fn rejects_ascent_direction() {
        let (mut f, x, direction, f0, _gd0) = descent_setup(2);
        let options = SolverOptions::new();
        let mut search = Backtracking::new(&options);
        let state = SolverState::new(x);
        let ascent_gd0 = 1.0;
        let result = search.search(&mut f, &state, direction.as_ref(), 1.0, f0, ascent_gd0);
        assert!(result.is_err());
    }
}
