//! Run configuration.
//!
//! A [`Config`] is a plain JSON document with one section per concern. Every
//! section has defaults, so a document only needs to name what it changes:
//!
//! ```
//! use eigspace::config::Config;
//!
//! let conf = Config::from_json_str(r#"{
//!     "eigenvalues": { "folder_name": "eig/hydrogen", "shift": -0.5 },
//!     "radial": { "kind": "fd", "xmax": 80.0, "count": 400 }
//! }"#).unwrap();
//! assert_eq!(conf.eigenvalues.shift, -0.5);
//! assert_eq!(conf.arnoldi.count, 10);
//! assert_eq!(conf.radial.postfix().join("_"), "fd_xmin0_xmax80_count400");
//! ```

use std::{ fs, path::{ Path, PathBuf } };
use serde::{ Deserialize, Serialize };
use crate::error::ConfigError;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where eigenpairs live and around which energy they are sought.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EigenvalueSection {
    /// Root folder for eigenpair files; unique to a given potential.
    pub folder_name: PathBuf,
    /// Shift σ of the shift-invert transform.
    pub shift: f64,
}

impl Default for EigenvalueSection {
    fn default() -> Self {
        Self { folder_name: PathBuf::from("eigenpairs"), shift: -0.5 }
    }
}

/// Parameters of the restarted Arnoldi iteration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ArnoldiSection {
    /// Number of wanted eigenvalues.
    pub count: usize,
    /// Dimension of the Krylov subspace; must exceed `count`.
    pub krylov_size: usize,
    /// Relative Ritz-estimate tolerance.
    pub tolerance: f64,
    /// Maximum number of implicit restarts.
    pub max_restarts: usize,
}

impl Default for ArnoldiSection {
    fn default() -> Self {
        Self {
            count: 10,
            krylov_size: 30,
            tolerance: crate::DEF_TOLERANCE,
            max_restarts: crate::DEF_MAXRESTARTS,
        }
    }
}

/// Parameters of the inner shifted linear solve.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShiftInvertSection {
    /// Residual tolerance requested from the linear solver.
    pub tolerance: f64,
    /// How many times a failed solve is retried with a relaxed tolerance.
    pub max_retries: usize,
    /// Factor applied to the tolerance on every retry.
    pub relax_factor: f64,
    /// Restart length of the GMRES solver.
    pub krylov_size: usize,
    /// Total number of GMRES iterations allowed per solve.
    pub max_iterations: usize,
}

impl Default for ShiftInvertSection {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_retries: 2,
            relax_factor: 10.0,
            krylov_size: 40,
            max_iterations: 2000,
        }
    }
}

/// Signature of the radial discretization.
///
/// Only used to derive deterministic file names; the discretization itself is
/// owned by whoever builds the Hamiltonian.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RadialSection {
    /// Discretization family, e.g. `"bspline"` or `"fd"`.
    pub kind: String,
    pub xmin: f64,
    pub xmax: f64,
    /// Number of radial basis functions / grid points.
    pub count: usize,
    /// Basis order, where the family has one.
    pub order: Option<usize>,
}

impl Default for RadialSection {
    fn default() -> Self {
        Self {
            kind: "fd".to_string(),
            xmin: 0.0,
            xmax: 100.0,
            count: 500,
            order: None,
        }
    }
}

impl RadialSection {
    /// Name fragments identifying this discretization.
    pub fn postfix(&self) -> Vec<String> {
        let mut parts = vec![
            self.kind.clone(),
            format!("xmin{}", self.xmin),
            format!("xmax{}", self.xmax),
            format!("count{}", self.count),
        ];
        if let Some(order) = self.order {
            parts.push(format!("order{}", order));
        }
        parts
    }
}

/// Parameters of the projection analysis.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisSection {
    /// Energies below this value are bound.
    pub bound_threshold: f64,
}

impl Default for AnalysisSection {
    fn default() -> Self { Self { bound_threshold: 0.0 } }
}

/// Full configuration document.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub eigenvalues: EigenvalueSection,
    pub arnoldi: ArnoldiSection,
    pub shift_invert: ShiftInvertSection,
    pub radial: RadialSection,
    pub analysis: AnalysisSection,
}

impl Config {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(source: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Read and parse a configuration file.
    pub fn from_file<P>(path: P) -> ConfigResult<Self>
    where P: AsRef<Path>
    {
        let path = path.as_ref();
        let source
            = fs::read_to_string(path)
            .map_err(|source| {
                ConfigError::Read { path: path.to_path_buf(), source }
            })?;
        Self::from_json_str(&source)
    }

    /// Serialize to JSON; this is the provenance copy stored alongside
    /// eigenpairs.
    ///
    /// Fails if `eigenvalues.folder_name` is not valid UTF-8.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
