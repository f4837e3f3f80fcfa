//! Implicitly restarted Arnoldi iteration on the shift-inverted Hamiltonian.
//!
//! A Krylov factorization *A V = V H + f eₘᵀ* of *A = (H - σ)⁻¹* is built to
//! `krylov_size` columns, the Ritz values of largest magnitude are kept and the
//! remaining ones are filtered out by implicitly shifted QR steps on the small
//! Hessenberg matrix before the factorization is extended again. See
//! [`docs`][crate::docs#implicitly-restarted-arnoldi].
//!
//! Running out of restarts is not an error: whatever has converged by then is
//! reported, as flagged by the convergence estimates.

use ndarray::{ self as nd, s };
use ndarray_linalg::{ Eig, Norm, QR };
use num_complex::Complex64 as C64;
use rand::{ rngs::StdRng, Rng, SeedableRng };
use tracing::{ debug, info, warn };
use crate::{
    config::{ ArnoldiSection, Config },
    error::{ EigError, LengthError },
    ops::ShiftedSolve,
    shift_invert::{ self, ShiftInvert },
    utils::{ dotc, fix_phase },
    DEF_MAXRESTARTS,
    DEF_TOLERANCE,
};

pub type EigResult<T> = Result<T, EigError>;

// classical Gram-Schmidt is repeated whenever it removes more than this
// fraction of the vector's norm
const DGKS_RATIO: f64 = 0.717;

// relative size of a residual signalling an invariant Krylov subspace
const BREAKDOWN: f64 = 1e-13;

/// Iteration parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ArnoldiParams {
    /// Number of wanted eigenvalues.
    pub count: usize,
    /// Dimension of the Krylov subspace; `count < krylov_size <= dim`.
    pub krylov_size: usize,
    /// A Ritz pair is converged once its residual estimate falls below
    /// `tolerance * |θ|`.
    pub tolerance: f64,
    /// Maximum number of implicit restarts.
    pub max_restarts: usize,
    /// Seed for the random starting vector.
    pub seed: u64,
}

impl Default for ArnoldiParams {
    fn default() -> Self {
        Self {
            count: 10,
            krylov_size: 30,
            tolerance: DEF_TOLERANCE,
            max_restarts: DEF_MAXRESTARTS,
            seed: 10546,
        }
    }
}

impl From<&ArnoldiSection> for ArnoldiParams {
    fn from(section: &ArnoldiSection) -> Self {
        Self {
            count: section.count,
            krylov_size: section.krylov_size,
            tolerance: section.tolerance,
            max_restarts: section.max_restarts,
            ..Self::default()
        }
    }
}

/// Result of an Arnoldi run.
///
/// Ritz values are those of the *inverted* operator, ordered by decreasing
/// magnitude. Eigenvectors are not stored; each is assembled on request from
/// the Krylov basis by [`Self::eigenvector`].
#[derive(Clone, Debug)]
pub struct ArnoldiOutput {
    shift: f64,
    ritz_values: nd::Array1<C64>,
    error_estimates: nd::Array1<f64>,
    convergence_estimates: nd::Array1<f64>,
    // [dim, krylov_size]
    basis: nd::Array2<C64>,
    // [krylov_size, count]
    ritz_vectors: nd::Array2<C64>,
    op_count: usize,
    restart_count: usize,
    orth_count: usize,
}

impl ArnoldiOutput {
    /// Number of reported Ritz pairs (converged or not).
    pub fn len(&self) -> usize { self.ritz_values.len() }

    pub fn is_empty(&self) -> bool { self.ritz_values.is_empty() }

    pub fn shift(&self) -> f64 { self.shift }

    /// Ritz values of the inverted operator.
    pub fn ritz_values(&self) -> &nd::Array1<C64> { &self.ritz_values }

    /// Residual estimates `|f| |yₘ|` of every Ritz pair.
    pub fn error_estimates(&self) -> &nd::Array1<f64> { &self.error_estimates }

    /// Convergence estimates; a negative entry marks a converged pair.
    pub fn convergence_estimates(&self) -> &nd::Array1<f64> {
        &self.convergence_estimates
    }

    /// Whether pair `i` converged.
    pub fn is_converged(&self, i: usize) -> bool {
        self.convergence_estimates.get(i).is_some_and(|c| *c < 0.0)
    }

    /// Indices of converged pairs.
    pub fn converged_indices(&self) -> Vec<usize> {
        (0..self.len()).filter(|i| self.is_converged(*i)).collect()
    }

    /// Energies *1/θ + σ* of every reported pair.
    pub fn eigenvalues(&self) -> nd::Array1<f64> {
        self.ritz_values.mapv(|theta| shift_invert::to_energy(theta, self.shift))
    }

    /// Energies of converged pairs only, in solver order.
    pub fn converged_eigenvalues(&self) -> nd::Array1<f64> {
        self.converged_indices().into_iter()
            .map(|i| shift_invert::to_energy(self.ritz_values[i], self.shift))
            .collect()
    }

    /// Assemble the normalized eigenvector of pair `i`, with its largest
    /// component made real and positive.
    ///
    /// *Panics if `i` is out of bounds*.
    pub fn eigenvector(&self, i: usize) -> nd::Array1<C64> {
        let mut v = self.basis.dot(&self.ritz_vectors.column(i));
        let norm = v.norm_l2();
        if norm > 0.0 { v.map_inplace(|vk| { *vk /= norm; }); }
        fix_phase(&mut v);
        v
    }

    /// Indices of converged pairs, in order of ascending energy.
    pub fn converged_by_energy(&self) -> Vec<usize> {
        let energies = self.eigenvalues();
        let mut order = self.converged_indices();
        order.sort_by(|&a, &b| energies[a].total_cmp(&energies[b]));
        order
    }

    /// Eigenvector of pair `i` split into `nang` angular rows, shaped
    /// `[nang, dim / nang]`, or `None` if `nang` does not divide
    /// [`Self::dim`].
    ///
    /// *Panics if `i` is out of bounds*.
    pub fn angular_eigenvector(&self, i: usize, nang: usize)
        -> Option<nd::Array2<C64>>
    {
        let dim = self.dim();
        if nang == 0 || dim % nang != 0 { return None; }
        self.eigenvector(i).into_shape((nang, dim / nang)).ok()
    }

    /// Length of the eigenvectors.
    pub fn dim(&self) -> usize { self.basis.nrows() }

    /// Number of applications of the shift-inverted operator.
    pub fn op_count(&self) -> usize { self.op_count }

    /// Number of implicit restarts performed.
    pub fn restart_count(&self) -> usize { self.restart_count }

    /// Number of Gram-Schmidt passes performed.
    pub fn orth_count(&self) -> usize { self.orth_count }
}

// Ritz pairs of the current factorization
struct Ritz {
    values: nd::Array1<C64>,
    vectors: nd::Array2<C64>,
    errors: nd::Array1<f64>,
    convergence: nd::Array1<f64>,
    unwanted: Vec<C64>,
}

impl Ritz {
    fn nconv(&self) -> usize {
        self.convergence.iter().filter(|c| **c < 0.0).count()
    }
}

// Arnoldi factorization A V = V H + f eₘᵀ
struct Krylov {
    v: nd::Array2<C64>,
    h: nd::Array2<C64>,
    f: nd::Array1<C64>,
    fscale: f64,
    orth_count: usize,
    rng: StdRng,
}

impl Krylov {
    fn new(start: nd::Array1<C64>, m: usize, rng: StdRng) -> EigResult<Self> {
        let n = start.len();
        let norm = start.norm_l2();
        if !(norm > 0.0) { return Err(EigError::ZeroStart); }
        let mut v: nd::Array2<C64> = nd::Array2::zeros((n, m));
        v.column_mut(0).assign(&start.mapv(|x| x / norm));
        let h: nd::Array2<C64> = nd::Array2::zeros((m, m));
        let f: nd::Array1<C64> = nd::Array1::zeros(n);
        Ok(Self { v, h, f, fscale: 1.0, orth_count: 0, rng })
    }

    fn m(&self) -> usize { self.h.nrows() }

    // remove the components of `w` along the first `j` basis vectors, with one
    // correction pass if cancellation is severe; returns the coefficients
    fn orthogonalize(&mut self, w: &mut nd::Array1<C64>, j: usize)
        -> nd::Array1<C64>
    {
        let vj = self.v.slice(s![.., ..j]);
        let before = w.norm_l2();
        let mut coeffs: nd::Array1<C64>
            = vj.columns().into_iter().map(|vk| dotc(&vk, &*w)).collect();
        *w -= &vj.dot(&coeffs);
        self.orth_count += 1;
        if w.norm_l2() < DGKS_RATIO * before {
            let corr: nd::Array1<C64>
                = vj.columns().into_iter().map(|vk| dotc(&vk, &*w)).collect();
            *w -= &vj.dot(&corr);
            coeffs += &corr;
            self.orth_count += 1;
        }
        coeffs
    }

    // unit vector orthogonal to the first `j` basis vectors, used when the
    // Krylov space becomes invariant
    fn fresh_direction(&mut self, j: usize) -> EigResult<nd::Array1<C64>> {
        let n = self.v.nrows();
        for _ in 0..3 {
            let mut r: nd::Array1<C64>
                = (0..n)
                .map(|_| {
                    C64::new(
                        self.rng.gen_range(-1.0..1.0),
                        self.rng.gen_range(-1.0..1.0),
                    )
                })
                .collect();
            self.orthogonalize(&mut r, j);
            self.orthogonalize(&mut r, j);
            let norm = r.norm_l2();
            if norm > BREAKDOWN {
                r.map_inplace(|rk| { *rk /= norm; });
                return Ok(r);
            }
        }
        Err(EigError::ZeroStart)
    }

    // grow the factorization from `from` to `m` columns
    fn extend<S>(&mut self, op: &mut ShiftInvert<S>, from: usize)
        -> EigResult<()>
    where S: ShiftedSolve
    {
        let m = self.m();
        for j in from..m {
            if j > 0 {
                let beta = self.f.norm_l2();
                if beta <= BREAKDOWN * self.fscale {
                    let r = self.fresh_direction(j)?;
                    self.h[[j, j - 1]] = C64::from(0.0);
                    self.v.column_mut(j).assign(&r);
                } else {
                    self.h[[j, j - 1]] = C64::from(beta);
                    let next = self.f.mapv(|fk| fk / beta);
                    self.v.column_mut(j).assign(&next);
                }
            }
            let mut w = op.apply(self.v.column(j))?;
            self.fscale = w.norm_l2().max(f64::MIN_POSITIVE);
            let coeffs = self.orthogonalize(&mut w, j + 1);
            self.h.slice_mut(s![..=j, j]).assign(&coeffs);
            self.f = w;
        }
        Ok(())
    }

    fn ritz(&self, params: &ArnoldiParams) -> EigResult<Ritz> {
        let m = self.m();
        let (vals, vecs) = self.h.eig()?;
        let mut order: Vec<usize> = (0..m).collect();
        order.sort_by(|&a, &b| vals[b].norm().total_cmp(&vals[a].norm()));
        let (wanted, unwanted) = order.split_at(params.count);
        let beta = self.f.norm_l2();
        let values: nd::Array1<C64> = wanted.iter().map(|&i| vals[i]).collect();
        let vectors: nd::Array2<C64> = vecs.select(nd::Axis(1), wanted);
        let errors: nd::Array1<f64>
            = vectors.columns().into_iter()
            .map(|y| beta * y[m - 1].norm() / y.norm_l2())
            .collect();
        let convergence: nd::Array1<f64>
            = errors.iter().zip(&values)
            .map(|(err, theta)| {
                err / theta.norm().max(f64::EPSILON) - params.tolerance
            })
            .collect();
        let unwanted: Vec<C64> = unwanted.iter().map(|&i| vals[i]).collect();
        Ok(Ritz { values, vectors, errors, convergence, unwanted })
    }

    // apply the unwanted Ritz values as implicit shifts and truncate the
    // factorization to `k` columns
    fn restart(&mut self, shifts: &[C64], k: usize) -> EigResult<()> {
        let m = self.m();
        let mut h = self.h.clone();
        let mut q_acc: nd::Array2<C64> = nd::Array2::eye(m);
        for &mu in shifts {
            let mut a = h.clone();
            a.diag_mut().iter_mut().for_each(|ak| { *ak -= mu; });
            let (q, _r) = a.qr()?;
            let qh = q.t().mapv(|x| x.conj());
            h = qh.dot(&h).dot(&q);
            q_acc = q_acc.dot(&q);
        }
        h.indexed_iter_mut()
            .filter(|((i, j), _)| *i > *j + 1)
            .for_each(|(_, hij)| { *hij = C64::from(0.0); });
        let beta_k = h[[k, k - 1]];
        let sigma_k = q_acc[[m - 1, k - 1]];
        let v_new = self.v.dot(&q_acc);
        let f_new
            = v_new.column(k).mapv(|x| x * beta_k)
            + self.f.mapv(|x| x * sigma_k);
        self.v.slice_mut(s![.., ..k]).assign(&v_new.slice(s![.., ..k]));
        self.v.slice_mut(s![.., k..]).fill(C64::from(0.0));
        self.h.fill(C64::from(0.0));
        self.h.slice_mut(s![..k, ..k]).assign(&h.slice(s![..k, ..k]));
        self.f = f_new;
        self.fscale = self.fscale.max(f64::MIN_POSITIVE);
        Ok(())
    }
}

/// Find the `params.count` eigenvalues of *(H - σ)⁻¹* of largest magnitude,
/// i.e. the eigenvalues of *H* closest to *σ*.
///
/// `start` overrides the random starting vector. Exhausting
/// `params.max_restarts` yields partial results (check
/// [`ArnoldiOutput::converged_indices`]); only invalid parameters and failures
/// of the shift-invert operator are errors.
pub fn solve<S>(
    op: &mut ShiftInvert<S>,
    params: &ArnoldiParams,
    start: Option<nd::ArrayView1<C64>>,
) -> EigResult<ArnoldiOutput>
where S: ShiftedSolve
{
    EigError::check_tolerance(params.tolerance)?;
    EigError::check_count(params.count)?;
    let n = op.dim();
    EigError::check_krylov(params.count, params.krylov_size, n)?;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let start: nd::Array1<C64>
        = match start {
            Some(v) => {
                LengthError::check_len(v.len(), n)?;
                v.to_owned()
            },
            None => {
                (0..n)
                    .map(|_| {
                        C64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
                    })
                    .collect()
            },
        };
    let ops_before = op.op_count();
    let mut kry = Krylov::new(start, params.krylov_size, rng)?;
    kry.extend(op, 0)?;

    let mut restarts: usize = 0;
    let ritz
        = loop {
            let ritz = kry.ritz(params)?;
            let nconv = ritz.nconv();
            debug!(restart = restarts, nconv, "arnoldi iteration");
            if nconv >= params.count { break ritz; }
            if restarts >= params.max_restarts {
                warn!(
                    restarts,
                    nconv,
                    wanted = params.count,
                    "restart budget exhausted; returning partial results"
                );
                break ritz;
            }
            kry.restart(&ritz.unwanted, params.count)?;
            restarts += 1;
            kry.extend(op, params.count)?;
        };

    let out = ArnoldiOutput {
        shift: op.shift(),
        ritz_values: ritz.values,
        error_estimates: ritz.errors,
        convergence_estimates: ritz.convergence,
        basis: kry.v,
        ritz_vectors: ritz.vectors,
        op_count: op.op_count() - ops_before,
        restart_count: restarts,
        orth_count: kry.orth_count,
    };
    info!(
        converged = out.converged_indices().len(),
        wanted = params.count,
        op_count = out.op_count,
        restart_count = out.restart_count,
        orth_count = out.orth_count,
        "arnoldi finished"
    );
    Ok(out)
}

/// Everything produced by [`find_eigenpairs`].
pub struct EigenRun<S> {
    /// Solver state, including diagnostics and eigenvector access.
    pub output: ArnoldiOutput,
    /// The shift-invert operator, carrying the inner-solve error estimates.
    pub shift_invert: ShiftInvert<S>,
    /// Converged energies.
    pub eigenvalues: nd::Array1<f64>,
}

/// Set up shift-invert from `conf` around `solver` and find eigenpairs near
/// the configured shift.
pub fn find_eigenpairs<S>(conf: &Config, solver: S) -> EigResult<EigenRun<S>>
where S: ShiftedSolve
{
    let mut shift_invert = ShiftInvert::from_config(solver, conf);
    let params = ArnoldiParams::from(&conf.arnoldi);
    let output = solve(&mut shift_invert, &params, None)?;
    let eigenvalues = output.converged_eigenvalues();
    Ok(EigenRun { output, shift_invert, eigenvalues })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_linalg::{ Eigh, UPLO };
    use crate::ops::{ DenseOperator, DenseShiftedSolver, LinearOperator };

    // finite-difference radial hydrogen-like Hamiltonian for angular momentum
    // `l` on `n` interior points of (0, rmax]
    fn radial_hamiltonian(n: usize, rmax: f64, l: i32) -> nd::Array2<C64> {
        let dr = rmax / (n as f64 + 1.0);
        let mut h = nd::Array2::<C64>::zeros((n, n));
        for i in 0..n {
            let r = dr * (i as f64 + 1.0);
            let cent = (l * (l + 1)) as f64 / (2.0 * r * r);
            h[[i, i]] = C64::from(1.0 / dr.powi(2) - 1.0 / r + cent);
            if i + 1 < n {
                h[[i, i + 1]] = C64::from(-0.5 / dr.powi(2));
                h[[i + 1, i]] = C64::from(-0.5 / dr.powi(2));
            }
        }
        h
    }

    fn nearest(exact: &nd::Array1<f64>, shift: f64, count: usize) -> Vec<f64> {
        let mut e = exact.to_vec();
        e.sort_by(|a, b| (a - shift).abs().total_cmp(&(b - shift).abs()));
        e.truncate(count);
        e.sort_by(f64::total_cmp);
        e
    }

    #[test]
    fn finds_eigenvalues_nearest_shift() {
        let h = radial_hamiltonian(200, 60.0, 0);
        let (exact, _) = h.eigh(UPLO::Lower).unwrap();
        let shift = -0.3;
        let mut op = ShiftInvert::new(DenseShiftedSolver::new(h), shift);
        let params = ArnoldiParams {
            count: 4,
            krylov_size: 12,
            tolerance: 1e-10,
            max_restarts: 200,
            ..ArnoldiParams::default()
        };
        let out = solve(&mut op, &params, None).unwrap();
        assert_eq!(out.converged_indices().len(), 4);
        let mut found = out.converged_eigenvalues().to_vec();
        found.sort_by(f64::total_cmp);
        for (f, e) in found.iter().zip(nearest(&exact, shift, 4)) {
            assert!((f - e).abs() < 1e-8, "found {} expected {}", f, e);
        }
        assert!(out.op_count() >= params.krylov_size);
        assert!(out.orth_count() >= out.op_count());
    }

    #[test]
    fn eigenvectors_satisfy_eigen_equation() {
        let h = radial_hamiltonian(120, 40.0, 1);
        let dense = DenseOperator::new(h.clone());
        let mut op = ShiftInvert::new(DenseShiftedSolver::new(h), -0.2);
        let params = ArnoldiParams {
            count: 3,
            krylov_size: 10,
            tolerance: 1e-12,
            max_restarts: 300,
            ..ArnoldiParams::default()
        };
        let out = solve(&mut op, &params, None).unwrap();
        let energies = out.eigenvalues();
        for i in out.converged_indices() {
            let v = out.eigenvector(i);
            assert!((v.norm_l2() - 1.0).abs() < 1e-12);
            let resid = dense.apply(v.view()) - v.mapv(|x| x * energies[i]);
            assert!(resid.norm_l2() < 1e-6, "residual {}", resid.norm_l2());
        }
    }

    #[test]
    fn converged_pairs_sort_by_energy_and_split_by_block() {
        let h = radial_hamiltonian(120, 40.0, 0);
        let mut op = ShiftInvert::new(DenseShiftedSolver::new(h), -0.3);
        let params = ArnoldiParams {
            count: 3,
            krylov_size: 10,
            tolerance: 1e-12,
            max_restarts: 300,
            ..ArnoldiParams::default()
        };
        let out = solve(&mut op, &params, None).unwrap();
        let order = out.converged_by_energy();
        assert_eq!(order.len(), out.converged_indices().len());
        assert!(!order.is_empty());
        let energies = out.eigenvalues();
        assert!(order.windows(2).all(|w| energies[w[0]] < energies[w[1]]));

        let v = out.angular_eigenvector(order[0], 2).unwrap();
        assert_eq!(v.dim(), (2, 60));
        assert_eq!(v[[1, 0]], out.eigenvector(order[0])[60]);
        assert!(out.angular_eigenvector(order[0], 7).is_none());
        assert!(out.angular_eigenvector(order[0], 0).is_none());
    }

    #[test]
    fn exhausted_restarts_return_partial_results() {
        let h = radial_hamiltonian(150, 60.0, 0);
        let mut op = ShiftInvert::new(DenseShiftedSolver::new(h), 0.5);
        let params = ArnoldiParams {
            count: 6,
            krylov_size: 8,
            tolerance: 1e-14,
            max_restarts: 0,
            ..ArnoldiParams::default()
        };
        let out = solve(&mut op, &params, None).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(out.restart_count(), 0);
        assert!(out.converged_indices().len() < 6);
        assert_eq!(out.op_count(), 8);
    }

    #[test]
    fn full_krylov_space_converges_immediately() {
        let h = radial_hamiltonian(6, 10.0, 0);
        let mut op = ShiftInvert::new(DenseShiftedSolver::new(h), -1.0);
        let params = ArnoldiParams {
            count: 2,
            krylov_size: 6,
            tolerance: 1e-10,
            max_restarts: 0,
            ..ArnoldiParams::default()
        };
        let out = solve(&mut op, &params, None).unwrap();
        assert_eq!(out.converged_indices(), vec![0, 1]);
    }

    #[test]
    fn rejects_bad_parameters() {
        let h = radial_hamiltonian(10, 10.0, 0);
        let mut op = ShiftInvert::new(DenseShiftedSolver::new(h), -1.0);
        let mut params = ArnoldiParams {
            count: 4,
            krylov_size: 4,
            ..ArnoldiParams::default()
        };
        assert!(matches!(
            solve(&mut op, &params, None),
            Err(EigError::KrylovSize { .. }),
        ));
        params.krylov_size = 8;
        params.tolerance = 0.0;
        assert!(matches!(
            solve(&mut op, &params, None),
            Err(EigError::BadTolerance(_)),
        ));
        params.tolerance = 1e-8;
        let zero = nd::Array1::<C64>::zeros(10);
        assert!(matches!(
            solve(&mut op, &params, Some(zero.view())),
            Err(EigError::ZeroStart),
        ));
    }

    #[test]
    fn find_eigenpairs_uses_config() {
        let mut conf = Config::default();
        conf.eigenvalues.shift = -0.6;
        conf.arnoldi.count = 2;
        conf.arnoldi.krylov_size = 10;
        conf.arnoldi.tolerance = 1e-10;
        let h = radial_hamiltonian(400, 50.0, 0);
        let run = find_eigenpairs(&conf, DenseShiftedSolver::new(h)).unwrap();
        assert_eq!(run.eigenvalues.len(), 2);
        // hydrogen 1s and 2s lie closest to -0.6
        let mut e = run.eigenvalues.to_vec();
        e.sort_by(f64::total_cmp);
        assert!((e[0] + 0.5).abs() < 5e-3);
        assert!((e[1] + 0.125).abs() < 5e-3);
        assert_eq!(
            run.shift_invert.error_estimates().len(), run.output.op_count());
    }
}
