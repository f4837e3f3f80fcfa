//! Persistence of eigenpairs and Coulomb-wave energy windows.
//!
//! Files are NPZ archives whose entry names mirror a small hierarchy:
//! ```text
//! Eig/Eigenvalues                 f64 [N]
//! Eig/ErrorEstimateListGMRES      f64 [one per operator application]
//! Eig/ErrorEstimateListPIRAM      f64 [N]
//! Eig/ConvergenceEstimateEig      f64 [N]
//! Eig/Eigenvector_<i>             c64 [angular, radial]
//! Eig/@configObject               u8  [JSON of the originating Config]
//! Eig/@opCount                    u64 [1]
//! Eig/@restartCount               u64 [1]
//! Eig/@orthCount                  u64 [1]
//! Eig/@shift                      f64 [1]
//! ```
//! One file is written per combination of radial discretization and the sets
//! of `l` and `m` values covered by the solved problem, e.g.
//! `fd_xmin0_xmax100_count500_l[0]_m[0].npz`.

use std::{
    collections::{ BTreeMap, BTreeSet },
    fs::{ self, File },
    path::{ Path, PathBuf },
};
use ndarray as nd;
use ndarray_npy::{ NpzReader, NpzWriter, ReadableElement };
use num_complex::Complex64 as C64;
use tracing::{ error, info, warn };
use crate::{
    arnoldi::ArnoldiOutput,
    basis::AngularBasis,
    config::Config,
    error::StoreError,
    ops::Coordinator,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Group holding all eigenpair datasets.
pub const EIG_GROUP: &str = "Eig";

const COULOMB_GROUP: &str = "CoulombWaves";

/// Name of the dataset holding eigenvector `index`.
pub fn eigenvector_dataset_name(index: usize) -> String {
    format!("Eigenvector_{}", index)
}

/// Full path of the dataset holding eigenvector `index`.
pub fn eigenvector_dataset_path(index: usize) -> String {
    dataset_path(&eigenvector_dataset_name(index))
}

fn dataset_path(name: &str) -> String { format!("{}/{}", EIG_GROUP, name) }

fn attribute_path(name: &str) -> String { format!("{}/@{}", EIG_GROUP, name) }

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { path: path.to_path_buf(), source }
}

/// Render a set of quantum numbers as `[a_b_c]`, sorted and deduplicated.
pub fn set_label(values: &[i32]) -> String {
    let set: Vec<String>
        = values.iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|v| v.to_string())
        .collect();
    format!("[{}]", set.join("_"))
}

/// Deterministic file name for the eigenpairs of a problem covering the given
/// `l` and `m` values.
pub fn eigenpairs_path(conf: &Config, l: &[i32], m: &[i32]) -> PathBuf {
    let name
        = format!(
            "{}_l{}_m{}.npz",
            conf.radial.postfix().join("_"),
            set_label(l),
            set_label(m),
        );
    conf.eigenvalues.folder_name.join(name)
}

/// Store the converged eigenpairs of a solver run.
///
/// `basis` lists the angular blocks spanned by the solved problem; the
/// eigenvectors are stored shaped `[basis.len(), dim / basis.len()]`.
/// `gmres_errors` are the inner-solve error estimates of the shift-invert
/// operator. Pairs are written in order of ascending energy.
///
/// Only the coordinating process removes an existing file and writes; every
/// process then meets at the coordinator's barrier before returning, so no
/// caller can observe a partially written file. Failing to remove an existing
/// file is logged and tolerated; failing to write (or to serialize `conf`) is
/// an error, returned after the barrier.
pub fn save_eigenpairs<C>(
    conf: &Config,
    output: &ArnoldiOutput,
    gmres_errors: &[f64],
    basis: &AngularBasis,
    coordinator: &C,
) -> StoreResult<PathBuf>
where C: Coordinator + ?Sized
{
    let path = eigenpairs_path(conf, &basis.l_values(), &basis.m_values());
    let written
        = if coordinator.is_coordinator() {
            write_eigenpairs(&path, conf, output, gmres_errors, basis)
        } else {
            Ok(())
        };
    coordinator.barrier();
    written.map(|_| path)
}

fn write_eigenpairs(
    path: &Path,
    conf: &Config,
    output: &ArnoldiOutput,
    gmres_errors: &[f64],
    basis: &AngularBasis,
) -> StoreResult<()>
{
    let nang = basis.len();
    let dim = output.dim();
    if nang == 0 || dim % nang != 0 {
        return Err(StoreError::VectorShape {
            index: 0,
            found: dim,
            expected: nang * (dim / nang.max(1)),
        });
    }
    let conf_bytes = nd::Array1::from(conf.to_json_string()?.into_bytes());

    let order = output.converged_by_energy();
    let pick = |a: &nd::Array1<f64>| -> nd::Array1<f64> {
        order.iter().map(|&i| a[i]).collect()
    };
    let energies = pick(&output.eigenvalues());
    let piram = pick(output.error_estimates());
    let convergence = pick(output.convergence_estimates());

    if path.exists() {
        if let Err(err) = fs::remove_file(path) {
            error!(path = %path.display(), %err, "could not remove existing eigenpair file");
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    info!(count = energies.len(), path = %path.display(), "now storing eigenvectors");
    let file = File::create(path).map_err(io_error(path))?;
    let mut npz = NpzWriter::new(file);
    for (k, &i) in order.iter().enumerate() {
        let v
            = output.angular_eigenvector(i, nang)
            .ok_or(StoreError::VectorShape { index: k, found: dim, expected: dim })?;
        npz.add_array(eigenvector_dataset_path(k), &v)?;
    }
    npz.add_array(dataset_path("Eigenvalues"), &energies)?;
    npz.add_array(
        dataset_path("ErrorEstimateListGMRES"),
        &nd::Array1::from(gmres_errors.to_vec()),
    )?;
    npz.add_array(dataset_path("ErrorEstimateListPIRAM"), &piram)?;
    npz.add_array(dataset_path("ConvergenceEstimateEig"), &convergence)?;

    npz.add_array(attribute_path("configObject"), &conf_bytes)?;
    npz.add_array(attribute_path("opCount"), &nd::array![output.op_count() as u64])?;
    npz.add_array(
        attribute_path("restartCount"), &nd::array![output.restart_count() as u64])?;
    npz.add_array(attribute_path("orthCount"), &nd::array![output.orth_count() as u64])?;
    npz.add_array(attribute_path("shift"), &nd::array![output.shift()])?;
    npz.finish()?;
    Ok(())
}

/// Load previously stored eigenpairs for the given `l` and `m` sets.
///
/// A missing file is not an error: a warning is logged and two empty
/// sequences are returned. Each eigenvector is the first angular row of its
/// stored array.
pub fn load_eigenpairs(conf: &Config, l: &[i32], m: &[i32])
    -> StoreResult<(nd::Array1<f64>, Vec<nd::Array1<C64>>)>
{
    let path = eigenpairs_path(conf, l, m);
    if !path.exists() {
        warn!(path = %path.display(), "eigenstates file does not exist, skipping");
        return Ok((nd::Array1::zeros(0), Vec::new()));
    }
    let mut npz = open(&path)?;
    info!(path = %path.display(), "now loading eigenvalues");
    let energies: nd::Array1<f64> = npz.by_name(&dataset_path("Eigenvalues"))?;
    info!(count = energies.len(), "now loading eigenvectors");
    let vectors: Vec<nd::Array1<C64>>
        = (0..energies.len())
        .map(|i| {
            let v: nd::Array2<C64>
                = npz.by_name(&eigenvector_dataset_path(i))?;
            if v.nrows() == 0 {
                return Err(StoreError::Malformed(eigenvector_dataset_path(i)));
            }
            Ok(v.row(0).to_owned())
        })
        .collect::<StoreResult<_>>()?;
    Ok((energies, vectors))
}

/// Solver diagnostics stored alongside a set of eigenpairs.
#[derive(Clone, Debug)]
pub struct StoredDiagnostics {
    pub error_estimates_gmres: nd::Array1<f64>,
    pub error_estimates_piram: nd::Array1<f64>,
    pub convergence_estimates: nd::Array1<f64>,
    pub op_count: u64,
    pub restart_count: u64,
    pub orth_count: u64,
    pub shift: f64,
    /// The configuration the eigenpairs were computed with.
    pub config: Config,
}

/// Read the diagnostics and provenance of an eigenpair file.
pub fn load_diagnostics<P>(path: P) -> StoreResult<StoredDiagnostics>
where P: AsRef<Path>
{
    let mut npz = open(path.as_ref())?;
    let conf_bytes: nd::Array1<u8>
        = npz.by_name(&attribute_path("configObject"))?;
    let config: Config = serde_json::from_slice(&conf_bytes.to_vec())?;
    Ok(StoredDiagnostics {
        error_estimates_gmres:
            npz.by_name(&dataset_path("ErrorEstimateListGMRES"))?,
        error_estimates_piram:
            npz.by_name(&dataset_path("ErrorEstimateListPIRAM"))?,
        convergence_estimates:
            npz.by_name(&dataset_path("ConvergenceEstimateEig"))?,
        op_count: read_scalar(&mut npz, &attribute_path("opCount"))?,
        restart_count: read_scalar(&mut npz, &attribute_path("restartCount"))?,
        orth_count: read_scalar(&mut npz, &attribute_path("orthCount"))?,
        shift: read_scalar(&mut npz, &attribute_path("shift"))?,
        config,
    })
}

fn open(path: &Path) -> StoreResult<NpzReader<File>> {
    let file = File::open(path).map_err(io_error(path))?;
    Ok(NpzReader::new(file)?)
}

fn read_scalar<A>(npz: &mut NpzReader<File>, name: &str) -> StoreResult<A>
where A: ReadableElement + Copy
{
    let a: nd::Array1<A> = npz.by_name(name)?;
    a.first().copied().ok_or_else(|| StoreError::Malformed(name.to_string()))
}

/// Scattering states for one energy window at a fixed asymptotic charge.
#[derive(Clone, Debug)]
pub struct CoulombWaveWindow {
    /// Asymptotic charge.
    pub z: f64,
    /// Energies of the window, ascending.
    pub energies: nd::Array1<f64>,
    /// Waves per `l`, each shaped `[energies, radial]`.
    pub waves: BTreeMap<i32, nd::Array2<C64>>,
}

impl CoulombWaveWindow {
    /// Write the window to `path`, replacing any existing file.
    pub fn save<P>(&self, path: P) -> StoreResult<()>
    where P: AsRef<Path>
    {
        let path = path.as_ref();
        for (&l, w) in self.waves.iter() {
            if w.nrows() != self.energies.len() {
                return Err(StoreError::Malformed(coulomb_path(&format!("l_{}", l))));
            }
        }
        let file = File::create(path).map_err(io_error(path))?;
        let mut npz = NpzWriter::new(file);
        npz.add_array(coulomb_path("Z"), &nd::array![self.z])?;
        npz.add_array(coulomb_path("E"), &self.energies)?;
        let ls: nd::Array1<i32> = self.waves.keys().copied().collect();
        npz.add_array(coulomb_path("L"), &ls)?;
        for (l, w) in self.waves.iter() {
            npz.add_array(coulomb_path(&format!("l_{}", l)), w)?;
        }
        npz.finish()?;
        Ok(())
    }

    /// Read a window written by [`Self::save`].
    pub fn load<P>(path: P) -> StoreResult<Self>
    where P: AsRef<Path>
    {
        let mut npz = open(path.as_ref())?;
        let z: f64 = read_scalar(&mut npz, &coulomb_path("Z"))?;
        let energies: nd::Array1<f64> = npz.by_name(&coulomb_path("E"))?;
        let ls: nd::Array1<i32> = npz.by_name(&coulomb_path("L"))?;
        let waves: BTreeMap<i32, nd::Array2<C64>>
            = ls.iter()
            .map(|&l| {
                let w: nd::Array2<C64>
                    = npz.by_name(&coulomb_path(&format!("l_{}", l)))?;
                Ok((l, w))
            })
            .collect::<StoreResult<_>>()?;
        Ok(Self { z, energies, waves })
    }
}

fn coulomb_path(name: &str) -> String { format!("{}/{}", COULOMB_GROUP, name) }
