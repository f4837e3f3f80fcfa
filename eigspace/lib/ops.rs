//! Capability interfaces for the external collaborators of the core, plus
//! dense reference implementations.
//!
//! The eigensolver and projection engine never see a discretized Hamiltonian
//! directly. They act through four narrow seams:
//! - [`LinearOperator`]: a matrix-vector product,
//! - [`ShiftedSolve`]: a solve of *(H - σ)* *y* = *x* (the inner step of
//!   inverse iteration),
//! - [`Overlap`]: application of the basis overlap (metric) operator to a
//!   wavefunction,
//! - [`Coordinator`]: process-role bookkeeping and a collective barrier.
//!
//! The dense types here are adequate for small problems and for testing; large
//! problems supply their own sparse/iterative implementations.

use ndarray as nd;
use ndarray_linalg::{ error::LinalgError, FactorizeInto, LUFactorized, Norm, Solve };
use num_complex::Complex64 as C64;
use crate::error::{ LengthError, SolveError };

/// A linear map acting on state vectors.
pub trait LinearOperator {
    /// Length of the vectors the operator acts on.
    fn dim(&self) -> usize;

    /// Compute `H x`.
    fn apply(&self, x: nd::ArrayView1<C64>) -> nd::Array1<C64>;
}

/// Result of a single shifted linear solve.
#[derive(Clone, Debug)]
pub struct SolveOutcome {
    /// Approximate solution.
    pub x: nd::Array1<C64>,
    /// Relative residual `|(H - σ) x - b| / |b|`.
    pub residual: f64,
    /// Whether `residual` met the requested tolerance.
    pub converged: bool,
}

/// Solver for shifted systems *(H - σ)* *y* = *x*.
pub trait ShiftedSolve {
    /// Length of the vectors the solver acts on.
    fn dim(&self) -> usize;

    /// Attempt a solve to relative residual `tolerance`.
    ///
    /// Non-convergence is reported through [`SolveOutcome::converged`], not
    /// as an error; errors are reserved for outright failure.
    fn solve_shifted(
        &mut self,
        shift: f64,
        rhs: nd::ArrayView1<C64>,
        tolerance: f64,
    ) -> Result<SolveOutcome, SolveError>;
}

/// Overlap (metric) operator of a non-orthogonal radial basis.
pub trait Overlap {
    /// Apply the overlap operator to every angular block of `psi`, in place.
    fn multiply_overlap(&self, psi: &mut nd::Array2<C64>);
}

/// Role and synchronization of one process among a cooperating group.
pub trait Coordinator {
    /// `true` for exactly one process of the group.
    fn is_coordinator(&self) -> bool;

    /// Block until every process of the group has reached this call.
    fn barrier(&self);
}

/// The trivial group of one process.
#[derive(Copy, Clone, Debug, Default)]
pub struct SingleProcess;

impl Coordinator for SingleProcess {
    fn is_coordinator(&self) -> bool { true }

    fn barrier(&self) { }
}

/// Orthonormal radial basis.
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityOverlap;

impl Overlap for IdentityOverlap {
    fn multiply_overlap(&self, _psi: &mut nd::Array2<C64>) { }
}

/// Radial overlap matrix shared by all angular blocks.
#[derive(Clone, Debug)]
pub struct MatrixOverlap {
    s: nd::Array2<C64>,
}

impl MatrixOverlap {
    /// *Panics if `s` is not square*.
    pub fn new(s: nd::Array2<C64>) -> Self {
        assert_eq!(s.nrows(), s.ncols(), "overlap matrix must be square");
        Self { s }
    }

    /// Diagonal overlap, e.g. quadrature weights.
    pub fn diagonal(weights: &nd::Array1<f64>) -> Self {
        Self { s: nd::Array2::from_diag(&weights.mapv(C64::from)) }
    }

    pub fn matrix(&self) -> &nd::Array2<C64> { &self.s }
}

impl Overlap for MatrixOverlap {
    fn multiply_overlap(&self, psi: &mut nd::Array2<C64>) {
        psi.rows_mut().into_iter()
            .for_each(|mut row| {
                let new = self.s.dot(&row);
                row.assign(&new);
            });
    }
}

/// Dense Hamiltonian matrix.
#[derive(Clone, Debug)]
pub struct DenseOperator {
    h: nd::Array2<C64>,
}

impl DenseOperator {
    /// *Panics if `h` is not square*.
    pub fn new(h: nd::Array2<C64>) -> Self {
        assert_eq!(h.nrows(), h.ncols(), "operator matrix must be square");
        Self { h }
    }

    pub fn matrix(&self) -> &nd::Array2<C64> { &self.h }
}

impl LinearOperator for DenseOperator {
    fn dim(&self) -> usize { self.h.nrows() }

    fn apply(&self, x: nd::ArrayView1<C64>) -> nd::Array1<C64> {
        self.h.dot(&x)
    }
}

/// Direct shifted solver: LU factorization of *H - σ*, cached for the most
/// recent shift.
pub struct DenseShiftedSolver {
    h: nd::Array2<C64>,
    lu: Option<(f64, LUFactorized<nd::OwnedRepr<C64>>)>,
}

impl DenseShiftedSolver {
    /// *Panics if `h` is not square*.
    pub fn new(h: nd::Array2<C64>) -> Self {
        assert_eq!(h.nrows(), h.ncols(), "operator matrix must be square");
        Self { h, lu: None }
    }

    fn shifted(&self, shift: f64) -> nd::Array2<C64> {
        let mut a = self.h.clone();
        a.diag_mut().iter_mut().for_each(|ak| { *ak -= shift; });
        a
    }
}

impl ShiftedSolve for DenseShiftedSolver {
    fn dim(&self) -> usize { self.h.nrows() }

    fn solve_shifted(
        &mut self,
        shift: f64,
        rhs: nd::ArrayView1<C64>,
        tolerance: f64,
    ) -> Result<SolveOutcome, SolveError>
    {
        LengthError::check(&rhs, &self.h.row(0))?;
        let failed = |err: LinalgError| {
            SolveError::Failed { shift, reason: err.to_string() }
        };
        let lu
            = match self.lu.take() {
                Some((s, lu)) if s == shift => lu,
                _ => self.shifted(shift).factorize_into().map_err(failed)?,
            };
        let x = lu.solve(&rhs).map_err(failed);
        self.lu = Some((shift, lu));
        let x = x?;
        let bnorm = rhs.norm_l2();
        let mut r = self.h.dot(&x) - &rhs;
        r.scaled_add(C64::from(-shift), &x);
        let residual
            = if bnorm > 0.0 { r.norm_l2() / bnorm } else { r.norm_l2() };
        let converged = residual.is_finite() && residual <= tolerance;
        Ok(SolveOutcome { x, residual, converged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tridiag(n: usize) -> nd::Array2<C64> {
        let mut h = nd::Array2::<C64>::zeros((n, n));
        for i in 0..n {
            h[[i, i]] = C64::from(2.0 + i as f64 * 0.1);
            if i + 1 < n {
                h[[i, i + 1]] = C64::from(-1.0);
                h[[i + 1, i]] = C64::from(-1.0);
            }
        }
        h
    }

    #[test]
    fn dense_solver_inverts_shifted_operator() {
        let h = tridiag(12);
        let op = DenseOperator::new(h.clone());
        let mut solver = DenseShiftedSolver::new(h);
        let b: nd::Array1<C64>
            = (0..12).map(|k| C64::new(k as f64, 1.0)).collect();
        let shift = 0.37;
        let out = solver.solve_shifted(shift, b.view(), 1e-10).unwrap();
        assert!(out.converged);
        let back = op.apply(out.x.view()) - out.x.mapv(|xk| xk * shift);
        assert!((back - &b).norm_l2() < 1e-10);
    }

    #[test]
    fn dense_solver_rejects_wrong_length() {
        let mut solver = DenseShiftedSolver::new(tridiag(4));
        let b = nd::Array1::<C64>::ones(3);
        assert!(matches!(
            solver.solve_shifted(0.0, b.view(), 1e-10),
            Err(SolveError::Length(_)),
        ));
    }

    #[test]
    fn matrix_overlap_acts_on_every_block() {
        let s = MatrixOverlap::diagonal(&nd::array![1.0, 2.0, 3.0]);
        let mut psi = nd::Array2::<C64>::ones((2, 3));
        s.multiply_overlap(&mut psi);
        for row in psi.rows() {
            assert_eq!(row.to_vec(), vec![
                C64::from(1.0), C64::from(2.0), C64::from(3.0)]);
        }
    }
}
