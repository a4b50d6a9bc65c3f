//! Dense symmetric-indefinite `LDLᵀ` factorization.
//!
//! The interior-point program solver (§4.7) assembles a small, dense KKT
//! saddle-point system every iteration. Rather than reach for a sparse
//! factorization or a general dense linear-algebra expression engine, this
//! module hand-rolls the narrow factorization the saddle system actually
//! needs: a diagonal pivot sequence (no off-diagonal pivot search) with a
//! small Levenberg-style regularization guarding near-zero pivots. This is
//! sound because the augmented system is quasi-definite once the
//! complementarity diagonal has been added, so a fixed symmetric
//! permutation admits an `LDLᵀ` factorization for any ordering.

use faer::{Col, Mat, MatRef};
use problemo::Problem;

use crate::E;
use crate::linalg::solver::{LinearSolverError, Solver as LinearSolver};

/// Pivots with `|d_j|` below this floor are nudged away from zero rather
/// than rejected outright, mirroring the regularization interior-point
/// codes apply to the (1,1) block instead of failing the whole solve.
const PIVOT_FLOOR: E = 1e-12;

/// Dense `LDLᵀ` factorization: `A = L D Lᵀ` with `L` unit lower triangular
/// and `D` diagonal. Only the lower triangle of the input matrix is read.
pub struct DenseLdlt {
    n: usize,
    /// Unit lower-triangular factor; the diagonal is implicitly 1 and not stored.
    l: Mat<E>,
    d: Vec<E>,
    factored: bool,
}

impl LinearSolver for DenseLdlt {
    fn new() -> Self {
        Self {
            n: 0,
            l: Mat::zeros(0, 0),
            d: Vec::new(),
            factored: false,
        }
    }

    fn factorize(&mut self, mat: MatRef<E>) -> Result<(), Problem> {
        let n = mat.nrows();
        if mat.ncols() != n {
            return Err(LinearSolverError::DimensionMismatch.into());
        }

        let mut l = Mat::<E>::zeros(n, n);
        let mut d = vec![0.0; n];

        for j in 0..n {
            let mut sum = mat[(j, j)];
            for k in 0..j {
                sum -= l[(j, k)] * l[(j, k)] * d[k];
            }
            let mut pivot = sum;
            if pivot.abs() < PIVOT_FLOOR {
                pivot = if pivot >= 0.0 { PIVOT_FLOOR } else { -PIVOT_FLOOR };
            }
            d[j] = pivot;
            l[(j, j)] = 1.0;

            for i in (j + 1)..n {
                let mut sum = mat[(i, j)];
                for k in 0..j {
                    sum -= l[(i, k)] * l[(j, k)] * d[k];
                }
                l[(i, j)] = sum / pivot;
            }
        }

        self.n = n;
        self.l = l;
        self.d = d;
        self.factored = true;
        Ok(())
    }

    fn solve_in_place(&self, b: &mut Col<E>) -> Result<(), Problem> {
        if !self.factored {
            return Err(LinearSolverError::Uninitialized.into());
        }
        if b.nrows() != self.n {
            return Err(LinearSolverError::DimensionMismatch.into());
        }

        // Forward solve: L y = b.
        for i in 0..self.n {
            let mut sum = b[i];
            for k in 0..i {
                sum -= self.l[(i, k)] * b[k];
            }
            b[i] = sum;
        }

        // Scale: z = D^-1 y.
        for i in 0..self.n {
            b[i] /= self.d[i];
        }

        // Backward solve: L^T x = z.
        for i in (0..self.n).rev() {
            let mut sum = b[i];
            for k in (i + 1)..self.n {
                sum -= self.l[(k, i)] * b[k];
            }
            b[i] = sum;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use faer::Col;

    use super::*;

    #[test]
    fn factorizes_spd_matrix() {
        // A = [[4, 2], [2, 3]], positive definite.
        let a = Mat::from_fn(2, 2, |i, j| [[4.0, 2.0], [2.0, 3.0]][i][j]);
        let mut solver = DenseLdlt::new();
        solver.factorize(a.as_ref()).unwrap();

        let b = Col::from_fn(2, |i| [6.0, 5.0][i]);
        let x = solver.solve(b.as_ref()).unwrap();

        // Solution of [4 2; 2 3] x = [6; 5] is x = [1, 1].
        assert!((x[0] - 1.0).abs() < 1e-9);
        assert!((x[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn factorizes_indefinite_saddle_point_system() {
        // [[1, 0, 1], [0, 2, 1], [1, 1, 0]] — a small saddle-point-shaped
        // indefinite matrix (one negative eigenvalue).
        let a = Mat::from_fn(3, 3, |i, j| {
            [[1.0, 0.0, 1.0], [0.0, 2.0, 1.0], [1.0, 1.0, 0.0]][i][j]
        });
        let mut solver = DenseLdlt::new();
        solver.factorize(a.as_ref()).unwrap();

        let b = Col::from_fn(3, |i| [1.0, 1.0, 1.0][i]);
        let x = solver.solve(b.as_ref()).unwrap();

        // Verify A x == b directly rather than hand-deriving the solution.
        let residual: Vec<E> = (0..3)
            .map(|i| (0..3).map(|j| a[(i, j)] * x[j]).sum::<E>() - b[i])
            .collect();
        assert!(residual.iter().all(|r| r.abs() < 1e-9));
    }

    #[test]
    fn regularizes_near_singular_pivot() {
        let a = Mat::from_fn(2, 2, |i, j| [[0.0, 1.0], [1.0, 0.0]][i][j]);
        let mut solver = DenseLdlt::new();
        assert!(solver.factorize(a.as_ref()).is_ok());
    }
}
