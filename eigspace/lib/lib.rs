//! Provides an eigenpair solver and a spectral projection engine for analyzing
//! single-active-electron wavefunctions in terms of the eigenstates of a
//! field-free Hamiltonian.
//!
//! Provides implementations for the following:
//! - Eigenpairs:
//!     - Shift-invert spectral transform over an external shifted linear
//!       solver, with restarted GMRES as a matrix-free default
//!     - Implicitly restarted Arnoldi iteration[^1] with DGKS
//!       reorthogonalization
//!     - Persistence of eigenpairs keyed by radial discretization and
//!       angular momentum
//! - Analysis:
//!     - Eigenstate catalogs from stored eigenpairs or from Coulomb waves
//!     - Bound-state probability and removal of bound-state components
//!     - Photoelectron energy spectra (*dP*/*dE*) from a discretized
//!       continuum
//!     - Angle- and energy-resolved distributions with Coulomb phases
//!
//! The Hamiltonian, radial basis, overlap metric and process group are
//! external; they enter only through the traits in [`ops`].
//!
//! See [`docs`] for theoretical background.
//!
//! [^1]: D. C. Sorensen, "Implicit application of polynomial filters in a
//! k-step Arnoldi method." SIAM J. Matrix Anal. Appl. **13**, 357 (1992).

pub mod error;
pub mod config;
pub mod basis;
pub mod ops;
pub mod shift_invert;
pub mod gmres;
pub mod arnoldi;
pub mod store;
pub mod catalog;
pub mod special;
pub mod interp;
pub mod utils;
pub mod analysis;

pub mod docs;

pub(crate) const DEF_TOLERANCE: f64 = 1e-10;
pub(crate) const DEF_MAXRESTARTS: usize = 300;
