//! Restarted GMRES for shifted systems *(H - σ)* *x* = *b* over any
//! [`LinearOperator`].
//!
//! Every cycle builds an orthonormal Krylov basis of at most `krylov_size`
//! vectors by modified Gram-Schmidt, reducing the small Hessenberg least
//! squares problem with Givens rotations as it grows. The cycle's correction is
//! added to the iterate and the next cycle starts from the true residual.
//!
//! ```
//! use ndarray as nd;
//! use num_complex::Complex64 as C64;
//! use eigspace::{ gmres::Gmres, ops::{ DenseOperator, ShiftedSolve } };
//!
//! let h: nd::Array2<C64> = nd::Array2::from_diag(&nd::array![
//!     C64::from(1.0), C64::from(2.0), C64::from(3.0)]);
//! let mut gmres = Gmres::new(DenseOperator::new(h), 3, 10);
//! let b = nd::array![C64::from(1.0), C64::from(1.0), C64::from(1.0)];
//! let out = gmres.solve_shifted(-1.0, b.view(), 1e-12).unwrap();
//! assert!(out.converged);
//! assert!((out.x[2] - C64::from(0.25)).norm() < 1e-12);
//! ```

use ndarray as nd;
use ndarray_linalg::Norm;
use num_complex::Complex64 as C64;
use tracing::debug;
use crate::{
    config::Config,
    error::{ LengthError, SolveError },
    ops::{ LinearOperator, ShiftedSolve, SolveOutcome },
    utils::dotc,
};

/// GMRES(m) solver around a Hamiltonian `O`.
#[derive(Clone, Debug)]
pub struct Gmres<O> {
    op: O,
    krylov_size: usize,
    max_iterations: usize,
}

impl<O> Gmres<O>
where O: LinearOperator
{
    /// Create a new solver restarting every `krylov_size` iterations and
    /// giving up after `max_iterations` operator applications.
    pub fn new(op: O, krylov_size: usize, max_iterations: usize) -> Self {
        Self { op, krylov_size: krylov_size.max(1), max_iterations }
    }

    /// Take the restart length and iteration limit from a [`Config`].
    pub fn from_config(op: O, conf: &Config) -> Self {
        Self::new(
            op,
            conf.shift_invert.krylov_size,
            conf.shift_invert.max_iterations,
        )
    }

    pub fn operator(&self) -> &O { &self.op }

    fn apply_shifted(&self, shift: f64, x: nd::ArrayView1<C64>)
        -> nd::Array1<C64>
    {
        let mut y = self.op.apply(x);
        y.scaled_add(C64::from(-shift), &x);
        y
    }

    // one GMRES cycle from residual `r` of norm `rnorm`; returns the
    // correction and the number of operator applications used
    fn cycle(
        &self,
        shift: f64,
        r: &nd::Array1<C64>,
        rnorm: f64,
        target: f64,
        m: usize,
    ) -> Result<(nd::Array1<C64>, usize), SolveError>
    {
        let mut v: Vec<nd::Array1<C64>> = Vec::with_capacity(m + 1);
        v.push(r.mapv(|rk| rk / rnorm));
        let mut h: nd::Array2<C64> = nd::Array2::zeros((m + 1, m));
        let mut rot: Vec<(C64, C64)> = Vec::with_capacity(m);
        let mut g: nd::Array1<C64> = nd::Array1::zeros(m + 1);
        g[0] = C64::from(rnorm);

        let mut k: usize = 0;
        while k < m {
            let mut w = self.apply_shifted(shift, v[k].view());
            for (j, vj) in v.iter().enumerate() {
                let hjk: C64 = dotc(vj, &w);
                w.scaled_add(-hjk, vj);
                h[[j, k]] = hjk;
            }
            let wnorm = w.norm_l2();
            h[[k + 1, k]] = C64::from(wnorm);
            for (j, &(c, s)) in rot.iter().enumerate() {
                let a = h[[j, k]];
                let b = h[[j + 1, k]];
                h[[j, k]] = c.conj() * a + s.conj() * b;
                h[[j + 1, k]] = -s * a + c * b;
            }
            let a = h[[k, k]];
            let b = h[[k + 1, k]];
            let d = (a.norm_sqr() + b.norm_sqr()).sqrt();
            if d == 0.0 {
                return Err(SolveError::Failed {
                    shift,
                    reason: "singular Krylov matrix".to_string(),
                });
            }
            let (c, s) = (a / d, b / d);
            h[[k, k]] = C64::from(d);
            h[[k + 1, k]] = C64::from(0.0);
            let gk = g[k];
            g[k] = c.conj() * gk;
            g[k + 1] = -s * gk;
            rot.push((c, s));
            k += 1;
            if g[k].norm() <= target || wnorm == 0.0 { break; }
            v.push(w.mapv(|wk| wk / wnorm));
        }

        // back substitution for the upper triangular system
        let mut y: nd::Array1<C64> = nd::Array1::zeros(k);
        for i in (0..k).rev() {
            let acc
                = (i + 1..k).fold(g[i], |acc, j| acc - h[[i, j]] * y[j]);
            y[i] = acc / h[[i, i]];
        }
        let mut dx: nd::Array1<C64> = nd::Array1::zeros(r.len());
        y.iter().zip(v.iter())
            .for_each(|(yi, vi)| { dx.scaled_add(*yi, vi); });
        Ok((dx, k))
    }
}

impl<O> ShiftedSolve for Gmres<O>
where O: LinearOperator
{
    fn dim(&self) -> usize { self.op.dim() }

    fn solve_shifted(
        &mut self,
        shift: f64,
        rhs: nd::ArrayView1<C64>,
        tolerance: f64,
    ) -> Result<SolveOutcome, SolveError>
    {
        LengthError::check_len(rhs.len(), self.op.dim())?;
        let mut x: nd::Array1<C64> = nd::Array1::zeros(rhs.len());
        let bnorm = rhs.norm_l2();
        if bnorm == 0.0 {
            return Ok(SolveOutcome { x, residual: 0.0, converged: true });
        }
        let target = tolerance * bnorm;
        let mut r: nd::Array1<C64> = rhs.to_owned();
        let mut rnorm = bnorm;
        let mut iterations: usize = 0;
        while rnorm > target && iterations < self.max_iterations {
            let m = self.krylov_size.min(self.max_iterations - iterations);
            let (dx, used) = self.cycle(shift, &r, rnorm, target, m)?;
            iterations += used;
            x += &dx;
            r = &rhs - &self.apply_shifted(shift, x.view());
            rnorm = r.norm_l2();
            debug!(shift, iterations, residual = rnorm / bnorm, "gmres cycle");
        }
        let residual = rnorm / bnorm;
        let converged = residual.is_finite() && residual <= tolerance;
        Ok(SolveOutcome { x, residual, converged })
    }
}
