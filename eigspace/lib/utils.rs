//! Miscellaneous tools.

use ndarray::{ self as nd, Ix1, Ix2 };
use ndarray_linalg::Scalar;
use num_complex::Complex64 as C64;

/// Sesquilinear inner product `⟨q|p⟩ = Σ conj(q[k]) p[k]`.
///
/// Arrays of unequal length are truncated to the shorter one.
pub fn dotc<S, T, A>(
    q: &nd::ArrayBase<S, Ix1>,
    p: &nd::ArrayBase<T, Ix1>,
) -> A
where
    S: nd::Data<Elem = A>,
    T: nd::Data<Elem = A>,
    A: Scalar,
{
    q.iter().zip(p)
        .fold(A::zero(), |acc, (qk, pk)| acc + qk.conj() * *pk)
}

/// Project `psi` onto each column of `vectors`, i.e. compute `V† psi`.
///
/// `vectors` is shaped `[radial, states]`.
pub fn project<S, T>(
    vectors: &nd::ArrayBase<S, Ix2>,
    psi: &nd::ArrayBase<T, Ix1>,
) -> nd::Array1<C64>
where
    S: nd::Data<Elem = C64>,
    T: nd::Data<Elem = C64>,
{
    vectors.columns().into_iter()
        .map(|v| dotc(&v, psi))
        .collect()
}

/// Uniform grid `min, min + step, ...` up to but excluding `max`; it holds
/// `⌈(max - min) / step⌉` points.
pub fn energy_grid(min: f64, max: f64, step: f64) -> nd::Array1<f64> {
    nd::Array1::range(min, max, step)
}

/// Local spacing between adjacent discrete energies.
///
/// Interior points use the symmetric difference `(E[i+1] - E[i-1]) / 2`, the
/// two boundary points half of the spacing to their only neighbor. Returns
/// `None` for fewer than two energies.
pub fn energy_spacing<S>(energies: &nd::ArrayBase<S, Ix1>)
    -> Option<nd::Array1<f64>>
where S: nd::Data<Elem = f64>
{
    let n = energies.len();
    if n < 2 { return None; }
    let mut spacing: nd::Array1<f64> = nd::Array1::zeros(n);
    spacing[0] = (energies[1] - energies[0]) / 2.0;
    spacing[n - 1] = (energies[n - 1] - energies[n - 2]) / 2.0;
    spacing.slice_mut(nd::s![1..n - 1]).iter_mut()
        .zip(energies.windows(3))
        .for_each(|(sk, w)| { *sk = (w[2] - w[0]) / 2.0; });
    Some(spacing)
}

/// Density of states: the reciprocal of [`energy_spacing`].
pub fn density_of_states<S>(energies: &nd::ArrayBase<S, Ix1>)
    -> Option<nd::Array1<f64>>
where S: nd::Data<Elem = f64>
{
    energy_spacing(energies).map(|spacing| spacing.mapv(f64::recip))
}

/// Rotate the global phase of `v` in place so that its component of largest
/// magnitude is real and positive.
pub fn fix_phase<S>(v: &mut nd::ArrayBase<S, Ix1>)
where S: nd::DataMut<Elem = C64>
{
    let pivot
        = v.iter()
        .max_by(|l, r| l.norm_sqr().total_cmp(&r.norm_sqr()))
        .copied();
    if let Some(p) = pivot.filter(|p| p.norm() > 0.0) {
        let rot = p.conj() / p.norm();
        v.map_inplace(|vk| { *vk *= rot; });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotc_conjugates_left_argument() {
        let q = nd::array![C64::new(0.0, 1.0), C64::new(1.0, 0.0)];
        let p = nd::array![C64::new(0.0, 1.0), C64::new(2.0, 0.0)];
        assert_eq!(dotc(&q, &p), C64::new(3.0, 0.0));
    }

    #[test]
    fn energy_grid_has_ceil_points() {
        let e = energy_grid(0.0, 1.0, 0.3);
        assert_eq!(e.len(), 4);
        assert!((e[3] - 0.9).abs() < 1e-12);
        assert_eq!(energy_grid(0.0, 1.0, 0.25).len(), 4);
    }

    #[test]
    fn spacing_uses_symmetric_interior_and_half_edges() {
        let e = nd::array![0.0, 1.0, 3.0, 7.0];
        let s = energy_spacing(&e).unwrap();
        assert_eq!(s.to_vec(), vec![0.5, 1.5, 3.0, 2.0]);
        let d = density_of_states(&e).unwrap();
        assert!((d[1] - 1.0 / 1.5).abs() < 1e-15);
        assert!(energy_spacing(&nd::array![1.0]).is_none());
    }

    #[test]
    fn fix_phase_makes_pivot_real() {
        let mut v = nd::array![C64::new(0.0, 2.0), C64::new(0.5, 0.0)];
        fix_phase(&mut v);
        assert!((v[0] - C64::from(2.0)).norm() < 1e-15);
        assert!((v[1] - C64::new(0.0, -0.5)).norm() < 1e-15);
    }
}
