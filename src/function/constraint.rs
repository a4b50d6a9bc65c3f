use faer::{Col, ColRef, Mat};

use crate::E;

/// A constraint a [`super::Function`] carries alongside its objective.
/// Equality/inequality residuals follow the sign convention `= 0` / `≤ 0`.
pub enum Constraint {
    /// `a·x − b = 0`
    Equality { a: Col<E>, b: E },
    /// `a·x − b ≤ 0`
    Inequality { a: Col<E>, b: E },
    /// `lower ≤ x[index] ≤ upper`
    Box {
        index: usize,
        lower: Option<E>,
        upper: Option<E>,
    },
    /// `‖x − center‖ ≤ radius`
    EuclideanBall { center: Col<E>, radius: E },
    /// `½ xᵀQx + a·x + b ≤ 0`, `Q` symmetric PSD.
    Quadratic { q: Mat<E>, a: Col<E>, b: E },
    /// A user-supplied residual, non-positive when satisfied, tagged with
    /// whether the caller attests it is convex.
    Functional {
        residual: Box<dyn Fn(ColRef<E>) -> E + Send + Sync>,
        convex: bool,
    },
}

fn dot(a: ColRef<E>, b: ColRef<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * b[i]).sum()
}

impl Constraint {
    /// Dimension the constraint expects `x` to have, when statically known.
    pub fn dim(&self) -> Option<usize> {
        match self {
            Constraint::Equality { a, .. } | Constraint::Inequality { a, .. } => Some(a.nrows()),
            Constraint::Box { .. } => None,
            Constraint::EuclideanBall { center, .. } => Some(center.nrows()),
            Constraint::Quadratic { a, .. } => Some(a.nrows()),
            Constraint::Functional { .. } => None,
        }
    }

    /// Whether this constraint is convex. The analytic forms are convex by
    /// construction (`Quadratic` assumes `Q` PSD, per its doc); `Functional`
    /// carries the caller's own attestation.
    pub fn convex(&self) -> bool {
        match self {
            Constraint::Functional { convex, .. } => *convex,
            _ => true,
        }
    }

    /// Evaluates the residual; satisfied when `<= 0` for inequality-style
    /// constraints and `== 0` (within tolerance) for the equality kind.
    pub fn residual(&self, x: ColRef<E>) -> E {
        match self {
            Constraint::Equality { a, b } => dot(a.as_ref(), x) - b,
            Constraint::Inequality { a, b } => dot(a.as_ref(), x) - b,
            Constraint::Box { index, lower, upper } => {
                let v = x[*index];
                let lo = lower.map(|l| l - v).unwrap_or(E::NEG_INFINITY);
                let hi = upper.map(|u| v - u).unwrap_or(E::NEG_INFINITY);
                lo.max(hi)
            }
            Constraint::EuclideanBall { center, radius } => {
                let dist_sq: E = (0..x.nrows()).map(|i| (x[i] - center[i]).powi(2)).sum();
                dist_sq.sqrt() - radius
            }
            Constraint::Quadratic { q, a, b } => {
                let quad: E = (0..x.nrows())
                    .map(|i| (0..x.nrows()).map(|j| q[(i, j)] * x[i] * x[j]).sum::<E>())
                    .sum();
                0.5 * quad + dot(a.as_ref(), x) + b
            }
            Constraint::Functional { residual, .. } => residual(x),
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, Constraint::Equality { .. })
    }
}
