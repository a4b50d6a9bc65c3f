//! Line-search subsystem: step initializers (§4.4) that seed a trial step
//! and 1-D searches that accept or refine it against an Armijo/Wolfe-family
//! condition.

pub mod initializer;
pub mod search;

use faer::{Col, ColRef};

use crate::{E, function::Function};

pub use initializer::Initializer;
pub use search::Search;

/// A single evaluated point along a search direction: `(t, f(x + t·d), ∇f(x + t·d)·d)`.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub t: E,
    pub f: E,
    pub gd: E,
}

/// Evaluates `f` and `∇f·d` at `x + t·d`.
pub fn eval_step<F: Function + ?Sized>(f: &mut F, x: ColRef<E>, direction: ColRef<E>, t: E) -> Step {
    let n = x.nrows();
    let trial = Col::from_fn(n, |i| x[i] + t * direction[i]);
    let mut g = Col::<E>::zeros(n);
    let fv = f.value_and_grad(trial.as_ref(), &mut g);
    let gd = (0..n).map(|i| g[i] * direction[i]).sum();
    Step { t, f: fv, gd }
}

/// Armijo sufficient-decrease condition: `f(t) ≤ f₀ + c₁·t·gd₀`.
pub fn armijo(step: &Step, f0: E, gd0: E, c1: E) -> bool {
    step.f <= f0 + c1 * step.t * gd0
}

/// Weak-Wolfe curvature condition: `∇f(t)·d ≥ c₂·∇f₀·d`.
pub fn weak_wolfe(step: &Step, gd0: E, c2: E) -> bool {
    step.gd >= c2 * gd0
}

/// Strong-Wolfe curvature condition: `|∇f(t)·d| ≤ c₂·|∇f₀·d|`.
pub fn strong_wolfe(step: &Step, gd0: E, c2: E) -> bool {
    step.gd.abs() <= c2 * gd0.abs()
}

/// CG-DESCENT's numerically robust approximate-Wolfe condition:
/// `(2c₁−1)·gd₀ ≥ gd(t) ≥ c₂·gd₀`, valid only once `f(t) ≤ f₀ + ε`.
pub fn approximate_wolfe(step: &Step, gd0: E, c1: E, c2: E) -> bool {
    (2.0 * c1 - 1.0) * gd0 >= step.gd && step.gd >= c2 * gd0
}

/// Safeguarded quadratic interpolation of the minimizer of the 1-D quadratic
/// through `(0, f0, gd0)` and `(t, ft)`, clamped to `[lo, hi]·t`.
pub fn quadratic_interpolate(t: E, f0: E, gd0: E, ft: E, lo: E, hi: E) -> E {
    let denom = 2.0 * (ft - f0 - gd0 * t);
    if denom.abs() < E::EPSILON {
        return 0.5 * t;
    }
    let candidate = -gd0 * t * t / denom;
    candidate.clamp(lo * t, hi * t)
}

/// Safeguarded cubic interpolation through two bracket endpoints
/// `(t1, f1, gd1)` and `(t2, f2, gd2)`, following the `dcstep`
/// secant/cubic-minimizer construction.
pub fn cubic_interpolate(t1: E, f1: E, gd1: E, t2: E, f2: E, gd2: E) -> E {
    let d1 = gd1 + gd2 - 3.0 * (f1 - f2) / (t1 - t2);
    let s = d1.abs().max(gd1.abs()).max(gd2.abs());
    if s < E::EPSILON {
        return 0.5 * (t1 + t2);
    }
    let d2_sq = (d1 / s).powi(2) - (gd1 / s) * (gd2 / s);
    if d2_sq < 0.0 {
        return 0.5 * (t1 + t2);
    }
    let d2 = s * d2_sq.sqrt() * (t2 - t1).signum();
    let denom = gd2 - gd1 + 2.0 * d2;
    if denom.abs() < E::EPSILON {
        return 0.5 * (t1 + t2);
    }
    t2 - (t2 - t1) * (gd2 + d2 - d1) / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_interpolate_finds_exact_vertex() {
        // f(t) = (t - 2)^2, f0 = 4, gd0 = -4, sampled at t = 5 -> f = 9.
        let t = quadratic_interpolate(5.0, 4.0, -4.0, 9.0, 0.0, 1.0);
        assert!((t - 2.0).abs() < 1e-9);
    }

    #[test]
    fn armijo_rejects_insufficient_decrease() {
        let step = Step { t: 1.0, f: 0.0, gd: 0.0 };
        assert!(!armijo(&step, -1.0, -1.0, 0.1));
    }
}
