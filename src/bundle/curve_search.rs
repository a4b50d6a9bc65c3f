//! FPBA-family curve search (§4.6): classifies each trial point against four
//! tests — descent, sufficient decrease, null step, cutting-plane — and
//! reports which of the bundle's two moves (serious step vs. null step) to
//! take.

use faer::Col;
use macros::{explicit_options, use_option};

use crate::{E, SolverOptions, function::Function};

/// Outcome of a single curve-search trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Sufficient decrease was achieved: move the proximity center here.
    Serious,
    /// No decrease, but the new cutting plane still sharpens the model:
    /// append it without moving.
    Null,
}

/// Curve-search parameters (`m1 < m2` decrease thresholds, `m3` null-step
/// test, `m4` cutting-plane improvement test) shared by every trial.
#[explicit_options(name = SolverOptions)]
#[use_option(name = "bundle_m1", type_ = E, default = "0.01", description = "Descent-test threshold for a bundle serious step.")]
#[use_option(name = "bundle_m2", type_ = E, default = "0.1", description = "Sufficient-decrease threshold relative to the model's predicted decrease.")]
#[use_option(name = "bundle_m3", type_ = E, default = "0.5", description = "Null-step acceptance threshold on model agreement.")]
#[use_option(name = "bundle_m4", type_ = E, default = "0.5", description = "Minimum cutting-plane improvement required to keep a null step.")]
pub struct CurveSearch {}

impl CurveSearch {
    pub fn new(options: &SolverOptions) -> Self {
        Self { options: options.into() }
    }

    /// Evaluates `f` at the trial point `y = x_hat + t(x* - x_hat)` and
    /// classifies the step per the four-test rule: `f(y) <= f(x_hat) -
    /// m1*(f(x_hat) - r*)` drives a serious step; otherwise, if the plane at
    /// `y` raises the model enough (`m4`-test) or the descent is close to
    /// the `m3` fraction of the predicted decrease, it's kept as a null
    /// step; otherwise the trial is discarded.
    pub fn classify(&self, f_x_hat: E, f_y: E, predicted_decrease: E, plane_improvement: E) -> Option<StepKind> {
        if predicted_decrease <= E::EPSILON {
            return None;
        }
        let actual_decrease = f_x_hat - f_y;
        if actual_decrease >= self.options.bundle_m1 * predicted_decrease {
            return Some(StepKind::Serious);
        }
        if plane_improvement >= self.options.bundle_m4 * predicted_decrease || actual_decrease >= self.options.bundle_m3 * predicted_decrease {
            return Some(StepKind::Null);
        }
        None
    }

    /// Evaluates `f` (and its subgradient) at `y` for the caller, returning
    /// `(f_y, g_y)`.
    pub fn evaluate(&self, f: &mut dyn Function, y: &Col<E>) -> (E, Col<E>) {
        let n = y.nrows();
        let mut g = Col::<E>::zeros(n);
        let fy = f.value_and_grad(y.as_ref(), &mut g);
        (fy, g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_accepts_serious_step_on_large_decrease() {
        let options = SolverOptions::new();
        let search = CurveSearch::new(&options);
        let kind = search.classify(10.0, 2.0, 8.0, 0.0);
        assert_eq!(kind, Some(StepKind::Serious));
    }

    #[test]
    fn classify_rejects_trial_with_no_decrease_or_plane_gain() {
        let options = SolverOptions::new();
        let search = CurveSearch::new(&options);
        let kind = search.classify(10.0, 9.99, 8.0, 0.0);
        assert_eq!(kind, None);
    }
}
