//! Dense LP/QP entity and its primal-dual interior-point solver (§4.7).

pub mod ipm;

use derive_more::{Display, Error};
use faer::{Col, ColRef, Mat};
use problemo::Problem;

pub use ipm::MehrotraInteriorPoint;

use crate::{E, OptimizationProgram, Residual, SolverState};

#[derive(Debug, Display, Error, PartialEq)]
pub enum ProgramError {
    #[display("dimension mismatch among Q, c, A, b, G, h")]
    DimensionMismatch,
}

fn dot(a: ColRef<E>, b: ColRef<E>) -> E {
    (0..a.nrows()).map(|i| a[i] * b[i]).sum()
}

fn mat_vec(m: &Mat<E>, v: ColRef<E>) -> Col<E> {
    Col::from_fn(m.nrows(), |i| (0..m.ncols()).map(|j| m[(i, j)] * v[j]).sum())
}

fn mat_t_vec(m: &Mat<E>, v: ColRef<E>) -> Col<E> {
    Col::from_fn(m.ncols(), |j| (0..m.nrows()).map(|i| m[(i, j)] * v[i]).sum())
}

/// `minimize ½xᵀQx + cᵀx` s.t. `Ax = b`, `Gx ≤ h`, with `Q` symmetric PSD.
/// LP is the `Q = 0` special case.
pub struct Program {
    q: Mat<E>,
    c: Col<E>,
    a: Mat<E>,
    b: Col<E>,
    g: Mat<E>,
    h: Col<E>,
}

impl Program {
    pub fn new(q: Mat<E>, c: Col<E>, a: Mat<E>, b: Col<E>, g: Mat<E>, h: Col<E>) -> Result<Self, Problem> {
        let n = c.nrows();
        if q.nrows() != n || q.ncols() != n {
            return Err(ProgramError::DimensionMismatch.into());
        }
        if a.ncols() != n || a.nrows() != b.nrows() {
            return Err(ProgramError::DimensionMismatch.into());
        }
        if g.ncols() != n || g.nrows() != h.nrows() {
            return Err(ProgramError::DimensionMismatch.into());
        }
        Ok(Self { q, c, a, b, g, h })
    }

    /// Maps a free-variable inequality program `Ax ≤ b` into standard
    /// nonnegative form by substituting `x = x⁺ − x⁻` and introducing a
    /// slack `s = b − A(x⁺ − x⁻)`: the returned program has `2n + m`
    /// variables `(x⁺, x⁻, s) ≥ 0`, equality `[A, −A, I] z = b`, and
    /// inequality `−z ≤ 0`.
    pub fn from_inequality(q: Mat<E>, c: Col<E>, a: Mat<E>, b: Col<E>) -> Result<Self, Problem> {
        let n = c.nrows();
        let m = b.nrows();
        if a.nrows() != m || a.ncols() != n || q.nrows() != n || q.ncols() != n {
            return Err(ProgramError::DimensionMismatch.into());
        }

        let n2 = 2 * n + m;
        let q2 = Mat::from_fn(n2, n2, |i, j| {
            let (bi, oi) = if i < n { (0, i) } else if i < 2 * n { (1, i - n) } else { (2, i - 2 * n) };
            let (bj, oj) = if j < n { (0, j) } else if j < 2 * n { (1, j - n) } else { (2, j - 2 * n) };
            match (bi, bj) {
                (0, 0) => q[(oi, oj)],
                (0, 1) => -q[(oi, oj)],
                (1, 0) => -q[(oi, oj)],
                (1, 1) => q[(oi, oj)],
                _ => 0.0,
            }
        });
        let c2 = Col::from_fn(n2, |i| if i < n { c[i] } else if i < 2 * n { -c[i - n] } else { 0.0 });
        let a2 = Mat::from_fn(m, n2, |i, j| {
            if j < n {
                a[(i, j)]
            } else if j < 2 * n {
                -a[(i, j - n)]
            } else if j - 2 * n == i {
                1.0
            } else {
                0.0
            }
        });
        let g2 = Mat::from_fn(n2, n2, |i, j| if i == j { -1.0 } else { 0.0 });
        let h2 = Col::zeros(n2);
        Self::new(q2, c2, a2, b, g2, h2)
    }

    pub fn n(&self) -> usize {
        self.c.nrows()
    }

    pub fn m(&self) -> usize {
        self.h.nrows()
    }

    pub fn p(&self) -> usize {
        self.b.nrows()
    }

    pub fn q(&self) -> &Mat<E> {
        &self.q
    }

    pub fn c(&self) -> &Col<E> {
        &self.c
    }

    pub fn a(&self) -> &Mat<E> {
        &self.a
    }

    pub fn b(&self) -> &Col<E> {
        &self.b
    }

    pub fn g(&self) -> &Mat<E> {
        &self.g
    }

    pub fn h(&self) -> &Col<E> {
        &self.h
    }

    pub fn objective(&self, x: ColRef<E>) -> E {
        0.5 * dot(x, mat_vec(&self.q, x).as_ref()) + dot(self.c.as_ref(), x)
    }

    /// `‖Ax − b‖∞ ≤ ε` and `max(Gx − h) ≤ ε`.
    pub fn feasible(&self, x: ColRef<E>, eps: E) -> bool {
        let primal = mat_vec(&self.a, x);
        let primal_ok = (0..primal.nrows()).map(|i| (primal[i] - self.b[i]).abs()).fold(0.0, E::max) <= eps;

        let slack = mat_vec(&self.g, x);
        let slack_ok = (0..slack.nrows()).map(|i| slack[i] - self.h[i]).fold(E::NEG_INFINITY, E::max) <= eps;

        primal_ok && slack_ok
    }
}

impl OptimizationProgram for Program {
    fn compute_residual(&self, state: &SolverState) -> Residual {
        let x = state.x();
        let s = state.s();
        let lambda = state.lambda();
        let nu = state.nu();

        let qx = mat_vec(&self.q, x.as_ref());
        let gt_lambda = mat_t_vec(&self.g, lambda.as_ref());
        let at_nu = mat_t_vec(&self.a, nu.as_ref());
        let dual = Col::from_fn(self.n(), |i| qx[i] + self.c[i] + gt_lambda[i] + at_nu[i]);

        let ax = mat_vec(&self.a, x.as_ref());
        let primal = Col::from_fn(self.p(), |i| ax[i] - self.b[i]);

        let gx = mat_vec(&self.g, x.as_ref());
        let slack = Col::from_fn(self.m(), |i| gx[i] + s[i] - self.h[i]);

        let complementarity = Col::from_fn(self.m(), |i| s[i] * lambda[i]);

        Residual::new(dual, primal, slack, complementarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feasible_accepts_point_within_tolerance() {
        let q = Mat::<E>::zeros(2, 2);
        let c = Col::from_fn(2, |i| [1.0, 1.0][i]);
        let a = Mat::from_fn(1, 2, |_, _| 1.0);
        let b = Col::from_fn(1, |_| 2.0);
        let g = Mat::from_fn(1, 2, |_, j| if j == 0 { -1.0 } else { 0.0 });
        let h = Col::from_fn(1, |_| 0.0);
        let program = Program::new(q, c, a, b, g, h).unwrap();

        let x = Col::from_fn(2, |_| 1.0);
        assert!(program.feasible(x.as_ref(), 1e-9));
    }

    #[test]
    fn from_inequality_embeds_quadratic_block_with_sign_pattern() {
        let q = Mat::from_fn(1, 1, |_, _| 2.0);
        let c = Col::from_fn(1, |_| 1.0);
        let a = Mat::from_fn(1, 1, |_, _| 1.0);
        let b = Col::from_fn(1, |_| 5.0);
        let program = Program::from_inequality(q, c, a, b).unwrap();
        assert_eq!(program.n(), 3);
        assert_eq!(program.q()[(0, 1)], -2.0);
        assert_eq!(program.q()[(1, 1)], 2.0);
    }
}
