//! Special functions for the angular analysis of outgoing waves.

use std::f64::consts::PI;
use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::basis::LmIndex;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFS: [f64; 9] = [
    0.999_999_999_999_809_93,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_13,
    -176.615_029_162_140_59,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_571_6e-6,
    1.505_632_735_149_311_6e-7,
];

/// Complex logarithm of the gamma function via the Lanczos approximation
/// (*g* = 7, nine terms), accurate to about 1e-15 relative for *Re*(*z*) ≥ 1/2.
///
/// The left half-plane is reached through the reflection formula, in which
/// case the imaginary part is only determined up to a multiple of 2π.
pub fn ln_gamma(z: C64) -> C64 {
    if z.re < 0.5 {
        let sin_piz = (z * PI).sin();
        return C64::from(PI).ln() - sin_piz.ln() - ln_gamma(1.0 - z);
    }
    let z = z - 1.0;
    let x: C64
        = LANCZOS_COEFFS.iter().enumerate().skip(1)
        .fold(C64::from(LANCZOS_COEFFS[0]), |acc, (i, ci)| {
            acc + *ci / (z + i as f64)
        });
    let t = z + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + x.ln()
}

/// Coulomb phase *σ*<sub>*l*</sub> = arg Γ(*l* + 1 + *iη*), wrapped to
/// (-π, π].
///
/// For an electron escaping a residual charge *Z* with momentum *k*, the
/// Sommerfeld parameter is *η* = -*Z* / *k*.
///
/// ```
/// use eigspace::special::coulomb_phase;
///
/// assert_eq!(coulomb_phase(0, 0.0), 0.0);
/// assert!((coulomb_phase(0, 1.0) + 0.301_640_320_467_533).abs() < 1e-12);
/// ```
pub fn coulomb_phase(l: i32, eta: f64) -> f64 {
    let arg = ln_gamma(C64::new(f64::from(l) + 1.0, eta)).im;
    arg.sin().atan2(arg.cos())
}

/// Spherical harmonic *Y*<sub>*l*</sub><sup>*m*</sup>(*θ*, *φ*) with the
/// Condon-Shortley phase, *θ* polar and *φ* azimuthal.
///
/// Vanishes identically when `l < 0` or `|m| > l`.
pub fn y_lm(l: i32, m: i32, theta: f64, phi: f64) -> C64 {
    if l < 0 || m.abs() > l { return C64::from(0.0); }
    let pos = y_lm_nonneg(l as usize, m.unsigned_abs() as usize, theta, phi);
    match m {
        m if m >= 0 => pos,
        m if m % 2 == 0 => pos.conj(),
        _ => -pos.conj(),
    }
}

fn y_lm_nonneg(l: usize, m: usize, theta: f64, phi: f64) -> C64 {
    let plm = assoc_legendre(l, m, theta.cos());
    let ratio: f64
        = ((l - m + 1)..=(l + m))
        .fold(1.0, |acc, k| acc / k as f64);
    let norm = ((2 * l + 1) as f64 * ratio / (4.0 * PI)).sqrt();
    C64::from_polar(norm * plm, m as f64 * phi)
}

// P_l^m(x) for m >= 0, including the Condon-Shortley phase
fn assoc_legendre(l: usize, m: usize, x: f64) -> f64 {
    let root = (1.0 - x * x).max(0.0).sqrt();
    let pmm: f64
        = (1..=m)
        .fold(1.0, |acc, k| -acc * (2 * k - 1) as f64 * root);
    if l == m { return pmm; }
    let pmp1 = x * (2 * m + 1) as f64 * pmm;
    if l == m + 1 { return pmp1; }
    let (_, pl)
        = ((m + 2)..=l)
        .fold((pmm, pmp1), |(pkm2, pkm1), k| {
            let pk
                = ((2 * k - 1) as f64 * x * pkm1 - (k + m - 1) as f64 * pkm2)
                / (k - m) as f64;
            (pkm1, pk)
        });
    pl
}

/// Spherical harmonics tabulated once over a set of `(l, m)` pairs and fixed
/// polar and azimuthal grids.
#[derive(Clone, Debug)]
pub struct SphericalHarmonicTable {
    lms: Vec<LmIndex>,
    theta: nd::Array1<f64>,
    phi: nd::Array1<f64>,
    // [lm, theta, phi]
    values: nd::Array3<C64>,
}

impl SphericalHarmonicTable {
    pub fn new(lms: Vec<LmIndex>, theta: nd::Array1<f64>, phi: nd::Array1<f64>)
        -> Self
    {
        let values: nd::Array3<C64>
            = nd::Array3::from_shape_fn(
                (lms.len(), theta.len(), phi.len()),
                |(i, j, k)| y_lm(lms[i].l, lms[i].m, theta[j], phi[k]),
            );
        Self { lms, theta, phi, values }
    }

    pub fn len(&self) -> usize { self.lms.len() }

    pub fn is_empty(&self) -> bool { self.lms.is_empty() }

    pub fn lms(&self) -> &[LmIndex] { &self.lms }

    pub fn theta(&self) -> &nd::Array1<f64> { &self.theta }

    pub fn phi(&self) -> &nd::Array1<f64> { &self.phi }

    /// Values of the `index`-th harmonic, shaped `[theta, phi]`.
    pub fn get(&self, index: usize) -> Option<nd::ArrayView2<C64>> {
        (index < self.lms.len())
            .then(|| self.values.index_axis(nd::Axis(0), index))
    }
}
