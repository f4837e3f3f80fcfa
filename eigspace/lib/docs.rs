//! Theoretical background.
//!
//! # Contents
//! - [Background](#background)
//! - [Shift-invert](#shift-invert)
//! - [Implicitly restarted Arnoldi](#implicitly-restarted-arnoldi)
//! - [Projection onto a discretized continuum](#projection-onto-a-discretized-continuum)
//! - [Angular distributions](#angular-distributions)
//!
//! # Background
//! After a single active electron has been propagated through some
//! time-dependent interaction, its final wavefunction *ψ* is expanded in
//! partial waves,
//! ```text
//! ψ(r, θ, φ) = Σ  ψ_lm(r) Y_lm(θ, φ) / r
//!              lm
//! ```
//! with every radial function *ψ*<sub>*lm*</sub> discretized in some (in
//! general non-orthogonal) radial basis. In this library a wavefunction is
//! therefore a 2D array `psi[ang_idx, radial]`, where `ang_idx` enumerates the
//! `(l, m)` pairs of an [`AngularBasis`][crate::basis::AngularBasis].
//!
//! Observables after the interaction are found by expanding *ψ* in the
//! eigenstates of the field-free Hamiltonian *H*, which is block diagonal in
//! `(l, m)` for a central potential. The eigenstates below the ionization
//! threshold (*E* < 0) are bound; those above are a discretized version of
//! the continuum. A radial basis with overlap matrix *S* turns the eigenvalue
//! problem into the generalized problem
//! ```text
//! H v = E S v,    v† S v' = δ
//! ```
//! so that amplitudes are *c* = *v*† *S* *ψ*.
//!
//! # Shift-invert
//! Krylov methods find extremal eigenvalues first, but the extremal
//! eigenvalues of a discretized Hamiltonian are large, unphysical kinetic
//! energies set by the grid spacing. For a shift *σ*, the operator
//! ```text
//! A = (H - σ)⁻¹
//! ```
//! has the same eigenvectors as *H*, with eigenvalues
//! ```text
//!       1                   1
//! θ = -----    ⇔    E = --- + σ
//!     E - σ              θ
//! ```
//! so that the energies closest to *σ* become the eigenvalues of largest
//! magnitude of *A*. Applying *A* amounts to a linear solve with *H* - *σ*,
//! which is performed by an external (e.g. iterative) solver to some residual
//! tolerance. The relative residual of each solve is kept as an error estimate
//! of the application; an unconverged solve is retried with a relaxed tolerance
//! a limited number of times before giving up.
//!
//! # Implicitly restarted Arnoldi
//! The Arnoldi process builds an orthonormal basis *V* = [*v*₁, ..., *v*ₘ] of
//! the Krylov space span{*x*, *Ax*, ..., *A*ᵐ⁻¹*x*}, together with an upper
//! Hessenberg matrix *H*ₘ = *V*† *A* *V*:
//! ```text
//! A V = V Hₘ + f eₘᵀ
//! ```
//! Each new direction is orthogonalized by classical Gram-Schmidt, repeated
//! once more whenever it cancels most of the vector's norm (the DGKS
//! criterion[^1]). The eigenpairs (*θ*, *y*) of the small matrix *H*ₘ are Ritz
//! pairs, approximating eigenpairs (*θ*, *V y*) of *A* with residual norm
//! ```text
//! |A V y - θ V y| = |f| |eₘᵀ y|
//! ```
//! A Ritz pair is accepted once this residual drops below the tolerance
//! relative to |*θ*|. The library records, for every Ritz pair, the
//! convergence estimate
//! ```text
//! |f| |eₘᵀ y| / |θ| - tol
//! ```
//! so that a *negative* estimate flags a converged pair.
//!
//! Keeping *m* small requires restarts. Of the *m* Ritz values, the *k*
//! wanted ones (largest magnitude) are kept and the *m* - *k* unwanted ones
//! are used as shifts *μ* for implicit QR steps[^2]:
//! ```text
//! Hₘ - μ = Q R,    Hₘ ← Q† Hₘ Q,    V ← V Q
//! ```
//! After all shifts have been applied, the first *k* columns of *V* span a
//! Krylov space whose starting vector has been filtered by the polynomial
//! ∏ (*A* - *μ*), damping the unwanted directions. The factorization is
//! truncated to *k* columns, with new residual
//! ```text
//! f ← V[:, k] Hₘ[k, k - 1] + f Q[m - 1, k - 1]
//! ```
//! and extended back to *m* columns. The number of operator applications,
//! restarts and orthogonalizations are reported as diagnostics.
//!
//! # Projection onto a discretized continuum
//! For a normalized *ψ* and a complete, *S*-orthonormal set of eigenstates,
//! ```text
//! 1 = Σ |c_n|²,   c_n = v_n† S ψ
//! ```
//! split into a bound part (*E*<sub>*n*</sub> below a threshold) and a
//! continuum part. In a finite radial box the continuum is represented by
//! discrete states *E*₀ < *E*₁ < ... (the states of a block at or above the
//! bound threshold) whose spacing shrinks as the box grows.
//! Converting the discrete probabilities into a differential probability
//! requires the density of states, estimated from the local spacing
//! ```text
//!          E[i + 1] - E[i - 1]                     E[1] - E[0]
//! ΔE[i] = ---------------------,   ΔE[0] = -----------,  (same at the top)
//!                   2                              2
//!
//! dP       |c_i|²
//! -- (E) ≈ ------
//! dE       ΔE[i]
//! ```
//! The samples *dP*/*dE* at *E*<sub>*i*</sub> are interpolated linearly onto a
//! uniform energy grid, with no extrapolation past either end of a block.
//! With these spacings the trapezoidal integral of the interpolant reproduces
//! the continuum part of Σ |*c*<sub>*i*</sub>|² exactly, so the difference
//! between the raw continuum total and the re-integrated spectrum is a measure
//! of the error of sampling the interpolant on the grid, and the bound
//! probability plus the integrated spectrum should add up to one. Different `(l, m)` blocks are added
//! incoherently.
//!
//! # Angular distributions
//! The angle-resolved distribution of an outgoing electron is built from the
//! amplitudes *c*<sub>*lm*</sub>(*E*) of each partial wave. Scattering states
//! in a potential with an asymptotic Coulomb tail *-Z*/*r* are not plane
//! waves: with momentum *k* = √(2*E*) (atomic units), each carries the Coulomb
//! phase
//! ```text
//! σ_l = arg Γ(l + 1 + iη),    η = -Z / k
//! ```
//! evaluated here via the Lanczos approximation of ln Γ[^3]. The amplitude to
//! find the electron with energy *E* in direction (*θ*, *φ*) is then
//! ```text
//!                       l   iσ_l
//! f(E, θ, φ) = Σ  (-i)   e      c_lm(E) √(dN/dE) Y_lm(θ, φ)
//!              lm
//! ```
//! and the differential distribution is |*f*|². Since the phases rotate
//! rapidly with energy, each *c*<sub>*lm*</sub> is interpolated onto the
//! energy grid in polar form: the squared magnitude and the two components of
//! the unit phase are interpolated separately, the magnitude is clamped to be
//! non-negative and the phase is renormalized to the unit circle. Only states
//! with *E* > 0 enter, since *k* is real only there.
//!
//! [^1]: J. W. Daniel, W. B. Gragg, L. Kaufman, and G. W. Stewart,
//! "Reorthogonalization and stable algorithms for updating the Gram-Schmidt QR
//! factorization." Math. Comp. **30**, 772 (1976).
//!
//! [^2]: D. C. Sorensen, "Implicit application of polynomial filters in a
//! k-step Arnoldi method." SIAM J. Matrix Anal. Appl. **13**, 357 (1992).
//!
//! [^3]: C. Lanczos, "A precision approximation of the gamma function." SIAM
//! J. Numer. Anal. **1**, 86 (1964).
