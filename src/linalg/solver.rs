use derive_more::{Display, Error};
use faer::{Col, ColRef, Mat, MatRef};
use problemo::Problem;

use crate::E;

#[derive(Debug, Display, Error, PartialEq)]
pub enum LinearSolverError {
    #[display("Numeric factorization error")]
    NumericFactorization,

    #[display("Uninitialized error")]
    Uninitialized,

    #[display("Pivot breakdown during LDL^T factorization")]
    PivotBreakdown,

    #[display("Dimension mismatch between matrix and right-hand side")]
    DimensionMismatch,

    #[display("Unable to solve linear system")]
    SolveFailed,
}

/// Trait for dense symmetric (indefinite) linear solvers.
///
/// This core deliberately avoids sparse linear algebra (see the program
/// solver's Non-goals): the KKT saddle-point systems it assembles are small
/// and dense, so `factorize`/`solve` operate directly on `faer::Mat`/`Col`
/// rather than the sparse symbolic/numeric split a sparse solver needs.
/// Implementors must call `factorize` before `solve`/`solve_in_place`.
pub trait Solver {
    fn new() -> Self
    where
        Self: Sized;

    /// Factorizes the symmetric matrix `mat` (only the lower triangle is read).
    fn factorize(&mut self, mat: MatRef<E>) -> Result<(), Problem>;

    /// Solves the linear system in place for the given right-hand side vector `b`.
    fn solve_in_place(&self, b: &mut Col<E>) -> Result<(), Problem>;

    /// Solves the linear system for the given right-hand side vector `b` and returns the solution.
    fn solve(&self, b: ColRef<E>) -> Result<Col<E>, Problem> {
        let mut x = b.to_owned();
        self.solve_in_place(&mut x)?;
        Ok(x)
    }

    /// Solves for every column of `rhs` at once.
    fn solve_mat(&self, rhs: MatRef<E>) -> Result<Mat<E>, Problem> {
        let mut out = Mat::zeros(rhs.nrows(), rhs.ncols());
        for j in 0..rhs.ncols() {
            let col = self.solve(rhs.col(j))?;
            out.col_mut(j).copy_from(col.as_ref());
        }
        Ok(out)
    }
}
