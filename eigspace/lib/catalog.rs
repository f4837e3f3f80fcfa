//! Catalogs of eigenstates, grouped by angular block.
//!
//! A catalog maps every angular block to its eigenpairs, ordered by strictly
//! increasing energy. Two implementations share the [`Eigenbasis`] interface:
//! - [`Eigenstates`]: eigenpairs of the discretized Hamiltonian, loaded from
//!   the [eigenpair store][crate::store] or taken directly from fresh solver
//!   runs;
//! - [`CoulombWaves`]: analytic scattering states sampled on the radial grid,
//!   assembled from several energy windows computed for one asymptotic charge.
//!
//! Catalogs are built once and read-only afterwards. Iteration borrows the
//! catalog and may be restarted at will.

use std::path::{ Path, PathBuf };
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ debug, info };
use crate::{
    arnoldi::ArnoldiOutput,
    basis::{ AngularBasis, LmIndex },
    config::Config,
    error::{ CatalogError, LengthError },
    store::{ self, CoulombWaveWindow },
};

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Eigenpairs of a single angular block.
#[derive(Clone, Debug)]
pub struct StateBlock {
    pub ang_idx: usize,
    pub lm: LmIndex,
    /// Energies, ascending.
    pub energies: nd::Array1<f64>,
    /// Eigenvectors as columns, shaped `[radial, states]`.
    pub vectors: nd::Array2<C64>,
}

impl StateBlock {
    /// Create a new block, sorting the eigenpairs by energy.
    pub fn new(
        ang_idx: usize,
        lm: LmIndex,
        energies: nd::Array1<f64>,
        vectors: nd::Array2<C64>,
    ) -> CatalogResult<Self>
    {
        LengthError::check_len(energies.len(), vectors.ncols())?;
        let mut order: Vec<usize> = (0..energies.len()).collect();
        order.sort_by(|&a, &b| energies[a].total_cmp(&energies[b]));
        let energies: nd::Array1<f64> = order.iter().map(|&k| energies[k]).collect();
        let vectors = vectors.select(nd::Axis(1), &order);
        Ok(Self { ang_idx, lm, energies, vectors })
    }

    /// Create a new block from separately stored eigenvectors, which must all
    /// have the same length.
    pub fn from_pairs(
        ang_idx: usize,
        lm: LmIndex,
        energies: nd::Array1<f64>,
        vectors: &[nd::Array1<C64>],
    ) -> CatalogResult<Self>
    {
        LengthError::check_len(energies.len(), vectors.len())?;
        let radial = vectors.first().map(|v| v.len()).unwrap_or(0);
        for v in vectors.iter() {
            LengthError::check_len(v.len(), radial)?;
        }
        let columns: nd::Array2<C64>
            = nd::Array2::from_shape_fn(
                (radial, vectors.len()), |(r, k)| vectors[k][r]);
        Self::new(ang_idx, lm, energies, columns)
    }

    /// Create a new block from the converged pairs of a solver run over this
    /// block alone.
    pub fn from_output(ang_idx: usize, lm: LmIndex, output: &ArnoldiOutput)
        -> CatalogResult<Self>
    {
        let order = output.converged_by_energy();
        let all = output.eigenvalues();
        let energies: nd::Array1<f64> = order.iter().map(|&i| all[i]).collect();
        let vectors: Vec<nd::Array1<C64>>
            = order.iter().map(|&i| output.eigenvector(i)).collect();
        Self::from_pairs(ang_idx, lm, energies, &vectors)
    }

    pub fn len(&self) -> usize { self.energies.len() }

    pub fn is_empty(&self) -> bool { self.energies.is_empty() }

    /// Length of each eigenvector.
    pub fn radial_len(&self) -> usize { self.vectors.nrows() }

    /// Number of states with energy below `threshold`.
    pub fn bound_count(&self, threshold: f64) -> usize {
        self.energies.iter().take_while(|e| **e < threshold).count()
    }

    fn is_increasing(&self) -> bool {
        self.energies.iter().zip(self.energies.iter().skip(1))
            .all(|(a, b)| a < b)
    }
}

/// Borrowed view of (a leading part of) one [`StateBlock`].
#[derive(Clone, Debug)]
pub struct StateView<'a> {
    pub ang_idx: usize,
    pub l: i32,
    pub m: i32,
    pub energies: nd::ArrayView1<'a, f64>,
    /// Shaped `[radial, states]`.
    pub vectors: nd::ArrayView2<'a, C64>,
    /// How many of the leading states lie below the iteration threshold.
    pub bound: usize,
}

/// Iterator over the blocks of a catalog; see [`Eigenbasis`].
///
/// Blocks without any selected state are skipped.
#[derive(Clone, Debug)]
pub struct States<'a> {
    blocks: std::slice::Iter<'a, StateBlock>,
    threshold: f64,
    bound_only: bool,
}

impl<'a> Iterator for States<'a> {
    type Item = StateView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for block in self.blocks.by_ref() {
            let bound = block.bound_count(self.threshold);
            let n = if self.bound_only { bound } else { block.len() };
            if n == 0 { continue; }
            return Some(StateView {
                ang_idx: block.ang_idx,
                l: block.lm.l,
                m: block.lm.m,
                energies: block.energies.slice(nd::s![..n]),
                vectors: block.vectors.slice(nd::s![.., ..n]),
                bound,
            });
        }
        None
    }
}

/// Common interface of all eigenstate catalogs.
pub trait Eigenbasis {
    /// All blocks, in angular order.
    fn blocks(&self) -> &[StateBlock];

    /// Iterate over the states of every block with energy below `threshold`.
    fn iterate_bound_states(&self, threshold: f64) -> States<'_> {
        States { blocks: self.blocks().iter(), threshold, bound_only: true }
    }

    /// Iterate over *all* states of every block.
    ///
    /// `threshold` does not filter; it only sets [`StateView::bound`], so that
    /// consumers interested in the continuum can skip the leading bound
    /// states themselves.
    fn iterate_states(&self, threshold: f64) -> States<'_> {
        States { blocks: self.blocks().iter(), threshold, bound_only: false }
    }

    /// Asymptotic charge the states were computed for, if the catalog is tied
    /// to one.
    fn charge(&self) -> Option<f64> { None }

    /// Verify that energies are strictly increasing within every block.
    fn check(&self) -> CatalogResult<()> {
        self.blocks().iter()
            .find(|block| !block.is_increasing())
            .map_or(Ok(()), |block| {
                Err(CatalogError::NotIncreasing { ang_idx: block.ang_idx })
            })
    }
}

/// Eigenpairs of the discretized Hamiltonian.
#[derive(Clone, Debug)]
pub struct Eigenstates {
    blocks: Vec<StateBlock>,
}

impl Eigenstates {
    /// Load the stored eigenpairs of every block of `basis`.
    ///
    /// Blocks for which no eigenpairs have been stored yet are empty.
    pub fn load(conf: &Config, basis: &AngularBasis) -> CatalogResult<Self> {
        let blocks: Vec<StateBlock>
            = basis.iter()
            .map(|(ang_idx, lm)| {
                let (energies, vectors)
                    = store::load_eigenpairs(conf, &[lm.l], &[lm.m])?;
                debug!(ang_idx, l = lm.l, m = lm.m, count = energies.len(), "loaded block");
                StateBlock::from_pairs(ang_idx, lm, energies, &vectors)
            })
            .collect::<CatalogResult<_>>()?;
        Self::from_blocks(blocks)
    }

    /// Build a catalog from fresh solver runs, one per block of `basis` in
    /// angular order.
    pub fn from_runs(basis: &AngularBasis, outputs: &[ArnoldiOutput])
        -> CatalogResult<Self>
    {
        LengthError::check_len(outputs.len(), basis.len())?;
        let blocks: Vec<StateBlock>
            = basis.iter().zip(outputs)
            .map(|((ang_idx, lm), output)| {
                StateBlock::from_output(ang_idx, lm, output)
            })
            .collect::<CatalogResult<_>>()?;
        Self::from_blocks(blocks)
    }

    pub fn from_blocks(blocks: Vec<StateBlock>) -> CatalogResult<Self> {
        let catalog = Self { blocks };
        catalog.check()?;
        Ok(catalog)
    }
}

impl Eigenbasis for Eigenstates {
    fn blocks(&self) -> &[StateBlock] { &self.blocks }
}

/// Coulomb waves for one asymptotic charge, assembled from several disjoint
/// energy windows.
#[derive(Clone, Debug)]
pub struct CoulombWaves {
    z: f64,
    blocks: Vec<StateBlock>,
}

impl CoulombWaves {
    /// Load the windows stored in `paths` and assign the waves of each `l` to
    /// every block of `basis` with that `l`.
    ///
    /// Fails as soon as a window's charge disagrees with the first one's.
    pub fn from_files<P>(basis: &AngularBasis, paths: &[P]) -> CatalogResult<Self>
    where P: AsRef<Path>
    {
        let mut windows: Vec<(PathBuf, CoulombWaveWindow)>
            = Vec::with_capacity(paths.len());
        for path in paths.iter() {
            let path = path.as_ref().to_path_buf();
            let window = CoulombWaveWindow::load(&path)?;
            if let Some((_, first)) = windows.first() {
                if window.z != first.z {
                    return Err(CatalogError::ChargeMismatch {
                        expected: first.z,
                        found: window.z,
                        path,
                    });
                }
            }
            windows.push((path, window));
        }
        let z = windows.first().map(|(_, w)| w.z).ok_or(CatalogError::NoWindows)?;
        let blocks: Vec<StateBlock>
            = basis.iter()
            .map(|(ang_idx, lm)| Self::assemble(&windows, ang_idx, lm))
            .collect::<CatalogResult<_>>()?;
        info!(z, windows = windows.len(), blocks = blocks.len(), "loaded coulomb waves");
        let catalog = Self { z, blocks };
        catalog.check()?;
        Ok(catalog)
    }

    fn assemble(
        windows: &[(PathBuf, CoulombWaveWindow)],
        ang_idx: usize,
        lm: LmIndex,
    ) -> CatalogResult<StateBlock>
    {
        let mut energies: Vec<f64> = Vec::new();
        let mut vectors: Vec<nd::Array1<C64>> = Vec::new();
        for (path, window) in windows.iter() {
            let waves
                = window.waves.get(&lm.l)
                .ok_or_else(|| {
                    CatalogError::MissingWaves { l: lm.l, path: path.clone() }
                })?;
            LengthError::check_len(waves.nrows(), window.energies.len())?;
            energies.extend(window.energies.iter().copied());
            vectors.extend(waves.rows().into_iter().map(|row| row.to_owned()));
        }
        StateBlock::from_pairs(ang_idx, lm, energies.into(), &vectors)
    }

    /// Asymptotic charge shared by all windows.
    pub fn z(&self) -> f64 { self.z }
}

impl Eigenbasis for CoulombWaves {
    fn blocks(&self) -> &[StateBlock] { &self.blocks }

    fn charge(&self) -> Option<f64> { Some(self.z) }
}
