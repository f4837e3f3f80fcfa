//! Collection of all error types.
//!
//! All errors derive [`thiserror::Error`], making them composable when allowed
//! and compatible with application code using [`anyhow`][anyhow].
//!
//! Only conditions that must stop a computation are represented here. Solver
//! restart exhaustion, missing eigenpair files and failed pre-write cleanup are
//! recoverable and are reported through [`tracing`] instead.
//!
//! [anyhow]: https://crates.io/crates/anyhow

use std::path::PathBuf;
use ndarray as nd;
use ndarray_linalg::error::LinalgError;
use ndarray_npy::{ ReadNpzError, WriteNpzError };
use thiserror::Error;

/// Returned when an operation requiring equal-length arrays encounters arrays
/// with unequal length.
#[derive(Debug, Error)]
#[error("encountered arrays with incompatible lengths; got {0} and {1}")]
pub struct LengthError(pub usize, pub usize);

impl LengthError {
    pub(crate) fn check<S, A, T, B>(
        a: &nd::ArrayBase<S, nd::Ix1>,
        b: &nd::ArrayBase<T, nd::Ix1>,
    ) -> Result<(), Self>
    where
        S: nd::Data<Elem = A>,
        T: nd::Data<Elem = B>,
    {
        Self::check_len(a.len(), b.len())
    }

    pub(crate) fn check_len(na: usize, nb: usize) -> Result<(), Self> {
        (na == nb).then_some(()).ok_or(Self(na, nb))
    }
}

/// Returned from the [shift-invert operator][crate::shift_invert] when the
/// shifted linear solve cannot be brought to convergence.
#[derive(Debug, Error)]
pub enum SolveError {
    /// The shifted solve did not converge, even after relaxing the tolerance
    /// the allowed number of times.
    #[error("shifted solve at sigma = {shift} did not converge after {attempts} attempt(s); residual {residual:e} > tolerance {tolerance:e}")]
    NotConverged {
        shift: f64,
        residual: f64,
        tolerance: f64,
        attempts: usize,
    },

    /// The external solver failed outright (e.g. a singular factorization).
    #[error("shifted solve at sigma = {shift} failed: {reason}")]
    Failed { shift: f64, reason: String },

    /// [`LengthError`]
    #[error("array length error: {0}")]
    Length(#[from] LengthError),
}

/// Returned from the [eigensolver][crate::arnoldi].
#[derive(Debug, Error)]
pub enum EigError {
    /// Returned when a non-positive tolerance is encountered.
    #[error("tolerance must be greater than 0; got {0}")]
    BadTolerance(f64),

    /// Returned when zero eigenvalues are requested.
    #[error("eigenvalue count must be greater than 0; got {0}")]
    BadCount(usize),

    /// Returned when the Krylov subspace cannot hold the wanted eigenvalues
    /// plus at least one shift, or is larger than the problem itself.
    #[error("krylov size must satisfy count < krylov_size <= dimension; got count = {count}, krylov_size = {krylov_size}, dimension = {dim}")]
    KrylovSize { count: usize, krylov_size: usize, dim: usize },

    /// Returned when the starting vector of the iteration vanishes.
    #[error("starting vector has zero norm")]
    ZeroStart,

    /// [`SolveError`]
    #[error("shift-invert error: {0}")]
    Solve(#[from] SolveError),

    /// [`LinalgError`]
    #[error("linalg error: {0}")]
    Linalg(#[from] LinalgError),

    /// [`LengthError`]
    #[error("array length error: {0}")]
    Length(#[from] LengthError),
}

impl EigError {
    pub(crate) fn check_tolerance(tolerance: f64) -> Result<(), Self> {
        (tolerance > 0.0).then_some(()).ok_or(Self::BadTolerance(tolerance))
    }

    pub(crate) fn check_count(count: usize) -> Result<(), Self> {
        (count != 0).then_some(()).ok_or(Self::BadCount(count))
    }

    pub(crate) fn check_krylov(count: usize, krylov_size: usize, dim: usize)
        -> Result<(), Self>
    {
        (count < krylov_size && krylov_size <= dim)
            .then_some(())
            .ok_or(Self::KrylovSize { count, krylov_size, dim })
    }
}

/// Returned from the [eigenpair store][crate::store] and the Coulomb-wave
/// window reader/writer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error at `path`.
    #[error("i/o error at '{}': {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    /// [`WriteNpzError`]
    #[error("npz write error: {0}")]
    Write(#[from] WriteNpzError),

    /// [`ReadNpzError`]
    #[error("npz read error: {0}")]
    Read(#[from] ReadNpzError),

    /// Failure to (de)serialize the provenance configuration.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Returned when an eigenvector does not match the declared grid shape.
    #[error("eigenvector {index} has {found} elements; expected {expected}")]
    VectorShape { index: usize, found: usize, expected: usize },

    /// Returned when a stored dataset is present but malformed.
    #[error("malformed dataset '{0}'")]
    Malformed(String),
}

/// Returned when constructing an [eigenstate catalog][crate::catalog].
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Two Coulomb-wave windows (or a window and the requested analysis) were
    /// computed for different asymptotic charges.
    #[error("coulomb wave charge mismatch in '{}': expected Z = {expected}, found Z = {found}", path.display())]
    ChargeMismatch { expected: f64, found: f64, path: PathBuf },

    /// A Coulomb-wave catalog was requested from an empty file list.
    #[error("no coulomb wave files given")]
    NoWindows,

    /// A Coulomb-wave window is missing the waves for a required `l`.
    #[error("coulomb wave file '{}' has no waves for l = {l}", path.display())]
    MissingWaves { l: i32, path: PathBuf },

    /// Energies within a block are not strictly increasing (e.g. overlapping
    /// energy windows or degenerate eigenvalues).
    #[error("energies in angular block {ang_idx} are not strictly increasing")]
    NotIncreasing { ang_idx: usize },

    /// [`StoreError`]
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// [`LengthError`]
    #[error("array length error: {0}")]
    Length(#[from] LengthError),
}

/// Returned from the [projection engine][crate::analysis].
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The energy grid arguments do not describe a non-empty grid.
    #[error("bad energy grid: min = {min}, max = {max}, step = {step}")]
    BadEnergyGrid { min: f64, max: f64, step: f64 },

    /// The wavefunction does not cover an angular block or radial length used
    /// by the catalog.
    #[error("wavefunction of shape {found:?} cannot hold block {ang_idx} with radial length {radial}")]
    Shape { found: (usize, usize), ang_idx: usize, radial: usize },

    /// A Coulomb-wave analysis was requested for a charge other than the one
    /// its waves were computed for.
    #[error("analysis requested for Z = {requested}, but coulomb waves were computed for Z = {found}")]
    Charge { requested: f64, found: f64 },

    /// [`CatalogError`]
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// [`LengthError`]
    #[error("array length error: {0}")]
    Length(#[from] LengthError),
}

impl AnalysisError {
    pub(crate) fn check_grid(min: f64, max: f64, step: f64)
        -> Result<(), Self>
    {
        (step > 0.0 && max > min && (max - min).is_finite())
            .then_some(())
            .ok_or(Self::BadEnergyGrid { min, max, step })
    }
}

/// Returned when loading a [configuration][crate::config::Config].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

