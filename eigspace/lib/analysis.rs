//! Projection of a wavefunction onto an eigenstate catalog.
//!
//! All quantities are computed from the overlap-corrected wavefunction *S ψ*,
//! since catalog eigenvectors are orthonormal with respect to the overlap
//! metric *S*. Angular blocks are treated as orthogonal channels: their
//! contributions are summed without cross terms.
//!
//! Only [`EigenstateAnalysis::remove_projection_on_bound_states`] mutates its
//! argument; every other method works on a copy.
//!
//! See [`docs`][crate::docs#projection-onto-a-discretized-continuum] for
//! background.

use std::f64::consts::PI;
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ debug, info };
use crate::{
    basis::LmIndex,
    catalog::{ CoulombWaves, Eigenbasis, StateView },
    config::Config,
    error::AnalysisError,
    interp,
    ops::Overlap,
    special::{ coulomb_phase, SphericalHarmonicTable },
    utils::{ density_of_states, energy_grid, project },
};

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Number of polar angles in an angular distribution, spanning `[0, π]`.
pub const THETA_COUNT: usize = 100;

/// Number of azimuthal angles in an angular distribution, spanning `[0, 2π]`.
pub const PHI_COUNT: usize = 200;

/// Projections onto the bound states of one angular block.
#[derive(Clone, Debug)]
pub struct BoundBlock {
    pub ang_idx: usize,
    pub lm: LmIndex,
    pub energies: nd::Array1<f64>,
    /// Shaped `[radial, states]`.
    pub vectors: nd::Array2<C64>,
    /// `⟨v_k|S ψ⟩` for every bound state `k`.
    pub projections: nd::Array1<C64>,
}

/// Output of [`EigenstateAnalysis::calculate_bound_distribution`].
#[derive(Clone, Debug)]
pub struct BoundDistribution {
    pub blocks: Vec<BoundBlock>,
    /// Total bound probability `Σ |⟨v_k|S ψ⟩|²`.
    pub total: f64,
}

/// Output of [`EigenstateAnalysis::calculate_energy_distribution`].
#[derive(Clone, Debug)]
pub struct EnergyDistribution {
    /// Uniform energy grid.
    pub energy: nd::Array1<f64>,
    /// Differential probability *dP*/*dE* on `energy`.
    pub density: nd::Array1<f64>,
    /// Raw projected probability of every state, bound or not.
    pub total_projected: f64,
    /// Raw projected probability of the states at or above the bound
    /// threshold.
    pub continuum_total: f64,
    /// `density` re-integrated over the grid.
    pub integrated: f64,
}

impl EnergyDistribution {
    /// Difference between the raw continuum probability and the re-integrated
    /// spectrum.
    pub fn interpolation_error(&self) -> f64 {
        self.continuum_total - self.integrated
    }
}

/// Output of [`EigenstateAnalysis::calculate_angular_distribution`].
#[derive(Clone, Debug)]
pub struct AngularDistribution {
    pub theta: nd::Array1<f64>,
    pub energy: nd::Array1<f64>,
    pub phi: nd::Array1<f64>,
    /// Differential distribution, shaped `[theta, energy, phi]`.
    pub distribution: nd::Array3<f64>,
}

/// Projection engine over a catalog `B` with overlap metric `O`.
#[derive(Clone, Debug)]
pub struct EigenstateAnalysis<B, O> {
    eigenbasis: B,
    overlap: O,
    bound_threshold: f64,
}

impl<B, O> EigenstateAnalysis<B, O>
where
    B: Eigenbasis,
    O: Overlap,
{
    /// Create a new analysis, with bound states being those of negative
    /// energy.
    pub fn new(eigenbasis: B, overlap: O) -> Self {
        Self { eigenbasis, overlap, bound_threshold: 0.0 }
    }

    /// Take the bound threshold from a [`Config`].
    pub fn from_config(eigenbasis: B, overlap: O, conf: &Config) -> Self {
        Self::new(eigenbasis, overlap)
            .with_bound_threshold(conf.analysis.bound_threshold)
    }

    pub fn with_bound_threshold(mut self, threshold: f64) -> Self {
        self.bound_threshold = threshold;
        self
    }

    pub fn bound_threshold(&self) -> f64 { self.bound_threshold }

    pub fn eigenbasis(&self) -> &B { &self.eigenbasis }

    pub fn overlap(&self) -> &O { &self.overlap }

    /// Return `S ψ` as a new array.
    pub fn multiply_overlap<S>(&self, psi: &nd::ArrayBase<S, nd::Ix2>)
        -> nd::Array2<C64>
    where S: nd::Data<Elem = C64>
    {
        let mut out = psi.to_owned();
        self.overlap.multiply_overlap(&mut out);
        out
    }

    /// Project `S ψ` onto every bound state.
    pub fn calculate_bound_distribution<S>(
        &self,
        psi: &nd::ArrayBase<S, nd::Ix2>,
    ) -> AnalysisResult<BoundDistribution>
    where S: nd::Data<Elem = C64>
    {
        let overlap_psi = self.multiply_overlap(psi);
        let mut total: f64 = 0.0;
        let blocks: Vec<BoundBlock>
            = self.eigenbasis.iterate_bound_states(self.bound_threshold)
            .map(|view| {
                let slice = block_slice(&overlap_psi, &view)?;
                let projections = project(&view.vectors, &slice);
                total += projections.iter().map(|p| p.norm_sqr()).sum::<f64>();
                Ok(BoundBlock {
                    ang_idx: view.ang_idx,
                    lm: LmIndex::new(view.l, view.m),
                    energies: view.energies.to_owned(),
                    vectors: view.vectors.to_owned(),
                    projections,
                })
            })
            .collect::<AnalysisResult<_>>()?;
        debug!(total, blocks = blocks.len(), "bound distribution");
        Ok(BoundDistribution { blocks, total })
    }

    /// Total probability of `ψ` to be found in a bound state.
    pub fn calculate_bound_probability<S>(
        &self,
        psi: &nd::ArrayBase<S, nd::Ix2>,
    ) -> AnalysisResult<f64>
    where S: nd::Data<Elem = C64>
    {
        self.calculate_bound_distribution(psi).map(|distr| distr.total)
    }

    /// Remove the bound-state component of `ψ` **in place**:
    /// `ψ ← ψ - Σ_k ⟨v_k|S ψ⟩ v_k` over all bound states, block by block.
    pub fn remove_projection_on_bound_states<S>(
        &self,
        psi: &mut nd::ArrayBase<S, nd::Ix2>,
    ) -> AnalysisResult<()>
    where S: nd::DataMut<Elem = C64>
    {
        let overlap_psi = self.multiply_overlap(&*psi);
        for view in self.eigenbasis.iterate_bound_states(self.bound_threshold) {
            let slice = block_slice(&overlap_psi, &view)?;
            let projections = project(&view.vectors, &slice);
            let bound_part = view.vectors.dot(&projections);
            let mut row = psi.row_mut(view.ang_idx);
            row -= &bound_part;
        }
        Ok(())
    }

    /// Differential probability *dP*/*dE* on the uniform grid
    /// `min_e, min_e + step, ...` (excluding `max_e`).
    ///
    /// Only continuum states (at or above the bound threshold) enter the
    /// spectrum: their squared projections are weighted by the density of
    /// states among the continuum states of their block and interpolated
    /// linearly onto the grid, with zero outside that energy range. Blocks
    /// with fewer than two continuum states have no density of states and add
    /// nothing to the spectrum.
    pub fn calculate_energy_distribution<S>(
        &self,
        psi: &nd::ArrayBase<S, nd::Ix2>,
        min_e: f64,
        max_e: f64,
        step: f64,
    ) -> AnalysisResult<EnergyDistribution>
    where S: nd::Data<Elem = C64>
    {
        AnalysisError::check_grid(min_e, max_e, step)?;
        info!("now calculating dP/dE");
        let overlap_psi = self.multiply_overlap(psi);
        let energy = energy_grid(min_e, max_e, step);
        let mut density: nd::Array1<f64> = nd::Array1::zeros(energy.len());
        let mut total_projected: f64 = 0.0;
        let mut continuum_total: f64 = 0.0;
        for view in self.eigenbasis.iterate_states(self.bound_threshold) {
            let slice = block_slice(&overlap_psi, &view)?;
            let prob: nd::Array1<f64>
                = project(&view.vectors, &slice).mapv(|p| p.norm_sqr());
            let continuum = prob.slice(nd::s![view.bound..]);
            total_projected += prob.sum();
            continuum_total += continuum.sum();
            let energies = view.energies.slice(nd::s![view.bound..]);
            let Some(dos) = density_of_states(&energies) else {
                debug!(ang_idx = view.ang_idx, "too few continuum states for a density of states; skipping");
                continue;
            };
            let weighted = &continuum * &dos;
            density += &interp::linear(&energy, &energies, &weighted)?;
            debug!(ang_idx = view.ang_idx, l = view.l, m = view.m, "energy distribution");
        }
        let integrated = density.sum() * step;
        info!(
            total_projected,
            continuum_total,
            integrated,
            interpolation_error = continuum_total - integrated,
            "energy distribution"
        );
        Ok(EnergyDistribution {
            energy,
            density,
            total_projected,
            continuum_total,
            integrated,
        })
    }

    /// Differential distribution over outgoing direction and energy, for an
    /// electron escaping an asymptotic charge `z`.
    ///
    /// For every block, the amplitudes of the states with positive energy are
    /// multiplied by the outgoing-wave phase `(-i)^l exp(iσ_l)` and by the
    /// square root of the density of states, interpolated in polar form onto
    /// the energy grid (zero outside the block's energy range), and combined
    /// with `Y_lm(θ, φ)`. The result is the squared magnitude of the summed
    /// amplitude on a `THETA_COUNT × len(E) × PHI_COUNT` grid.
    ///
    /// Fails if the catalog was computed for a charge other than `z`.
    pub fn calculate_angular_distribution<S>(
        &self,
        psi: &nd::ArrayBase<S, nd::Ix2>,
        min_e: f64,
        max_e: f64,
        step: f64,
        z: f64,
    ) -> AnalysisResult<AngularDistribution>
    where S: nd::Data<Elem = C64>
    {
        AnalysisError::check_grid(min_e, max_e, step)?;
        if let Some(found) = self.eigenbasis.charge() {
            if found != z {
                return Err(AnalysisError::Charge { requested: z, found });
            }
        }
        let overlap_psi = self.multiply_overlap(psi);
        let energy = energy_grid(min_e, max_e, step);
        let theta: nd::Array1<f64> = nd::Array1::linspace(0.0, PI, THETA_COUNT);
        let phi: nd::Array1<f64> = nd::Array1::linspace(0.0, 2.0 * PI, PHI_COUNT);

        let views: Vec<StateView>
            = self.eigenbasis.iterate_states(self.bound_threshold)
            .collect();
        let lms: Vec<LmIndex>
            = views.iter().map(|view| LmIndex::new(view.l, view.m)).collect();
        debug!(count = lms.len(), "tabulating spherical harmonics");
        let ylm = SphericalHarmonicTable::new(lms, theta.clone(), phi.clone());

        let mut amplitude: nd::Array3<C64>
            = nd::Array3::zeros((THETA_COUNT, energy.len(), PHI_COUNT));
        for (index, view) in views.iter().enumerate() {
            let first_open
                = view.energies.iter().take_while(|e| **e <= 0.0).count();
            let energies = view.energies.slice(nd::s![first_open..]);
            let Some(dos) = density_of_states(&energies) else {
                debug!(ang_idx = view.ang_idx, "too few continuum states; skipping");
                continue;
            };
            let slice = block_slice(&overlap_psi, view)?;
            let proj
                = project(&view.vectors.slice(nd::s![.., first_open..]), &slice);
            let l_phase = C64::new(0.0, -1.0).powi(view.l);
            let partial: nd::Array1<C64>
                = energies.iter().zip(&proj).zip(&dos)
                .map(|((e, p), d)| {
                    let k = (2.0 * e).sqrt();
                    let sigma = coulomb_phase(view.l, -z / k);
                    l_phase * C64::from_polar(1.0, sigma) * p * d.sqrt()
                })
                .collect();
            let on_grid = interp::polar(&energy, &energies, &partial)?;
            let Some(y) = ylm.get(index) else { continue; };
            amplitude.indexed_iter_mut()
                .for_each(|((i, j, k), a)| { *a += y[[i, k]] * on_grid[j]; });
            debug!(ang_idx = view.ang_idx, l = view.l, m = view.m, "angular distribution");
        }
        let distribution = amplitude.mapv(|a| a.norm_sqr());
        Ok(AngularDistribution { theta, energy, phi, distribution })
    }
}

fn block_slice<'a>(psi: &'a nd::Array2<C64>, view: &StateView)
    -> AnalysisResult<nd::ArrayView1<'a, C64>>
{
    let radial = view.vectors.nrows();
    if view.ang_idx >= psi.nrows() || radial != psi.ncols() {
        return Err(AnalysisError::Shape {
            found: psi.dim(),
            ang_idx: view.ang_idx,
            radial,
        });
    }
    Ok(psi.row(view.ang_idx))
}

/// Projection engine over a [`CoulombWaves`] catalog.
pub type CoulombWaveAnalysis<O> = EigenstateAnalysis<CoulombWaves, O>;

impl<O> EigenstateAnalysis<CoulombWaves, O>
where O: Overlap
{
    /// Create a new analysis over Coulomb waves computed for charge `z`.
    ///
    /// Fails if the waves were computed for a different charge.
    pub fn coulomb(waves: CoulombWaves, overlap: O, z: f64)
        -> AnalysisResult<Self>
    {
        if waves.z() != z {
            return Err(AnalysisError::Charge { requested: z, found: waves.z() });
        }
        Ok(Self::new(waves, overlap))
    }

    /// Asymptotic charge of the underlying waves.
    pub fn z(&self) -> f64 { self.eigenbasis.z() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{ Eigenstates, StateBlock },
        ops::{ IdentityOverlap, MatrixOverlap },
    };

    // three orthonormal states in a 3-point "radial" space: two bound, one
    // continuum, plus a 2-state continuum-only block
    fn catalog() -> Eigenstates {
        let eye: nd::Array2<C64> = nd::Array2::eye(3);
        let s = nd::Array2::from_shape_fn((3, 2), |(r, k)| {
            if r == k + 1 { C64::from(1.0) } else { C64::from(0.0) }
        });
        Eigenstates::from_blocks(vec![
            StateBlock::new(
                0, LmIndex::new(0, 0), nd::array![-0.5, -0.125, 0.25], eye)
                .unwrap(),
            StateBlock::new(
                1, LmIndex::new(1, 0), nd::array![0.2, 0.6], s)
                .unwrap(),
        ]).unwrap()
    }

    fn psi() -> nd::Array2<C64> {
        nd::array![
            [C64::new(0.5, 0.0), C64::new(0.0, 0.5), C64::new(0.3, 0.0)],
            [C64::new(0.0, 0.0), C64::new(0.4, 0.0), C64::new(0.0, -0.3)],
        ]
    }

    #[test]
    fn bound_distribution_projects_every_bound_state() {
        let analysis = EigenstateAnalysis::new(catalog(), IdentityOverlap);
        let distr = analysis.calculate_bound_distribution(&psi()).unwrap();
        assert_eq!(distr.blocks.len(), 1);
        assert_eq!(distr.blocks[0].projections.len(), 2);
        assert!((distr.blocks[0].projections[1] - C64::new(0.0, 0.5)).norm() < 1e-15);
        assert!((distr.total - 0.5).abs() < 1e-15);
        assert!((analysis.calculate_bound_probability(&psi()).unwrap() - 0.5).abs() < 1e-15);
    }

    #[test]
    fn threshold_moves_states_between_bound_and_continuum() {
        let analysis
            = EigenstateAnalysis::new(catalog(), IdentityOverlap)
            .with_bound_threshold(-0.2);
        let p = analysis.calculate_bound_probability(&psi()).unwrap();
        assert!((p - 0.25).abs() < 1e-15);
    }

    #[test]
    fn overlap_is_applied_to_a_copy() {
        let overlap = MatrixOverlap::diagonal(&nd::array![2.0, 1.0, 1.0]);
        let analysis = EigenstateAnalysis::new(catalog(), overlap);
        let psi = psi();
        let spsi = analysis.multiply_overlap(&psi);
        assert_eq!(spsi[[0, 0]], C64::new(1.0, 0.0));
        assert_eq!(psi[[0, 0]], C64::new(0.5, 0.0));
        // |2 * 0.5|² + |0.5 i|²
        let p = analysis.calculate_bound_probability(&psi).unwrap();
        assert!((p - 1.25).abs() < 1e-15);
    }

    #[test]
    fn bound_removal_is_idempotent() {
        let analysis = EigenstateAnalysis::new(catalog(), IdentityOverlap);
        let mut psi = psi();
        analysis.remove_projection_on_bound_states(&mut psi).unwrap();
        assert!(analysis.calculate_bound_probability(&psi).unwrap() < 1e-30);
        assert_eq!(psi[[0, 2]], C64::new(0.3, 0.0));
        assert_eq!(psi.row(1), self::psi().row(1));
        let once = psi.clone();
        analysis.remove_projection_on_bound_states(&mut psi).unwrap();
        assert_eq!(psi, once);
    }

    #[test]
    fn wavefunction_shape_is_checked() {
        let analysis = EigenstateAnalysis::new(catalog(), IdentityOverlap);
        let short = nd::Array2::<C64>::zeros((1, 3));
        assert!(matches!(
            analysis.calculate_energy_distribution(&short, 0.0, 1.0, 0.1),
            Err(AnalysisError::Shape { ang_idx: 1, .. }),
        ));
        let narrow = nd::Array2::<C64>::zeros((2, 2));
        assert!(matches!(
            analysis.calculate_bound_probability(&narrow),
            Err(AnalysisError::Shape { ang_idx: 0, radial: 3, .. }),
        ));
    }

    #[test]
    fn energy_distribution_weights_by_density_of_states() {
        let analysis = EigenstateAnalysis::new(catalog(), IdentityOverlap);
        let distr
            = analysis.calculate_energy_distribution(&psi(), 0.0, 1.0, 0.05)
            .unwrap();
        assert_eq!(distr.energy.len(), 20);
        // block 1: |0.4|² and |0.3|² at 0.2 and 0.6, each with spacing 0.2;
        // block 0 has a single continuum state and no density of states
        let at = |e: f64| -> f64 {
            let j = ((e - 0.0) / 0.05).round() as usize;
            distr.density[j]
        };
        assert!((at(0.4) - (0.16 + 0.09) / 2.0 / 0.2).abs() < 1e-12);
        assert!(at(0.65) == 0.0);
        let block1_at_025 = (0.16 + (0.09 - 0.16) * 0.125) / 0.2;
        assert!((at(0.25) - block1_at_025).abs() < 1e-12);
        // nothing from the bound states below the first continuum state
        assert!(distr.density.iter().take(4).all(|d| *d == 0.0));
        assert!((distr.total_projected - (0.25 + 0.25 + 0.09 + 0.16 + 0.09)).abs() < 1e-14);
        assert!((distr.continuum_total - 0.34).abs() < 1e-14);
        assert!(
            (distr.interpolation_error() - (distr.continuum_total - distr.integrated))
            .abs() < 1e-15
        );
    }

    #[test]
    fn bound_states_stay_out_of_the_spectrum() {
        // with the threshold at -0.2 only the state at -0.5 is bound; block 0
        // then has continuum states at -0.125 and 0.25
        let analysis
            = EigenstateAnalysis::new(catalog(), IdentityOverlap)
            .with_bound_threshold(-0.2);
        let distr
            = analysis.calculate_energy_distribution(&psi(), -0.5, 1.0, 0.125)
            .unwrap();
        let at = |e: f64| -> f64 {
            let j = ((e + 0.5) / 0.125).round() as usize;
            distr.density[j]
        };
        assert_eq!(at(-0.5), 0.0);
        assert_eq!(at(-0.25), 0.0);
        assert!((at(-0.125) - 0.25 / 0.1875).abs() < 1e-12);
        assert!((at(0.125) - (0.25 + (0.09 - 0.25) * (2.0 / 3.0)) / 0.1875).abs() < 1e-12);
        assert!((distr.continuum_total - (0.25 + 0.09 + 0.16 + 0.09)).abs() < 1e-14);
        assert!((distr.total_projected - distr.continuum_total - 0.25).abs() < 1e-14);
    }

    #[test]
    fn energy_grid_is_validated() {
        let analysis = EigenstateAnalysis::new(catalog(), IdentityOverlap);
        assert!(matches!(
            analysis.calculate_energy_distribution(&psi(), 1.0, 0.0, 0.1),
            Err(AnalysisError::BadEnergyGrid { .. }),
        ));
        assert!(matches!(
            analysis.calculate_angular_distribution(&psi(), 0.0, 1.0, 0.0, 1.0),
            Err(AnalysisError::BadEnergyGrid { .. }),
        ));
    }

    #[test]
    fn angular_distribution_shape_and_sign() {
        let analysis = EigenstateAnalysis::new(catalog(), IdentityOverlap);
        let distr
            = analysis.calculate_angular_distribution(&psi(), 0.1, 0.7, 0.01, 1.0)
            .unwrap();
        assert_eq!(distr.distribution.dim(), (THETA_COUNT, 60, PHI_COUNT));
        assert_eq!(distr.theta.len(), THETA_COUNT);
        assert_eq!(distr.phi.len(), PHI_COUNT);
        assert!(distr.distribution.iter().all(|v| *v >= 0.0 && v.is_finite()));
        // only block 1 has two positive-energy states; nothing outside them
        let j = ((0.65 - 0.1) / 0.01_f64).round() as usize;
        assert!(distr.distribution.index_axis(nd::Axis(1), j).iter().all(|v| *v == 0.0));
        let j = ((0.4 - 0.1) / 0.01_f64).round() as usize;
        assert!(distr.distribution.index_axis(nd::Axis(1), j).iter().any(|v| *v > 0.0));
    }

    #[test]
    fn single_channel_angular_distribution_follows_ylm() {
        // one s-wave channel: the distribution is isotropic with magnitude
        // |amplitude|² |Y_00|²
        let block = StateBlock::new(
            0,
            LmIndex::new(0, 0),
            nd::array![0.5, 1.0],
            nd::Array2::eye(2),
        ).unwrap();
        let catalog = Eigenstates::from_blocks(vec![block]).unwrap();
        let analysis = EigenstateAnalysis::new(catalog, IdentityOverlap);
        let psi = nd::array![[C64::new(0.6, 0.0), C64::new(0.0, 0.8)]];
        let distr
            = analysis.calculate_angular_distribution(&psi, 0.5, 1.0, 0.25, 1.0)
            .unwrap();
        // at E = 0.5: |0.6|² * dos(0.5) * |Y_00|² with dos = 1 / 0.25
        let expected = 0.36 * 4.0 / (4.0 * PI);
        let slab = distr.distribution.index_axis(nd::Axis(1), 0);
        assert!(slab.iter().all(|v| (v - expected).abs() < 1e-12));
    }
}
