//! Resampling of irregularly sampled spectra onto uniform grids.
//!
//! Both interpolants are piecewise linear and vanish outside the sampled
//! range; edges are never extrapolated.
//!
//! ```
//! use ndarray as nd;
//! use eigspace::interp::linear;
//!
//! let x = nd::array![0.0, 1.0, 3.0];
//! let y = nd::array![0.0, 2.0, 6.0];
//! let at = nd::array![-1.0, 0.5, 2.0, 3.0, 4.0];
//! let res = linear(&at, &x, &y).unwrap();
//! assert_eq!(res.to_vec(), vec![0.0, 1.0, 4.0, 6.0, 0.0]);
//! ```

use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Float;
use crate::error::LengthError;

pub type InterpResult<T> = Result<T, LengthError>;

/// Evaluate the piecewise-linear interpolant through `(data_x, data_y)` at every
/// point of `x`, with value zero outside `[data_x[0], data_x[n - 1]]`.
///
/// `data_x` must be increasing.
pub fn linear<R, S, T, A>(
    x: &nd::ArrayBase<R, nd::Ix1>,
    data_x: &nd::ArrayBase<S, nd::Ix1>,
    data_y: &nd::ArrayBase<T, nd::Ix1>,
) -> InterpResult<nd::Array1<A>>
where
    R: nd::Data<Elem = A>,
    S: nd::Data<Elem = A>,
    T: nd::Data<Elem = A>,
    A: Float,
{
    LengthError::check(data_x, data_y)?;
    let res: nd::Array1<A>
        = x.iter()
        .map(|xk| linear_at(*xk, data_x, data_y))
        .collect();
    Ok(res)
}

fn linear_at<S, T, A>(
    x: A,
    data_x: &nd::ArrayBase<S, nd::Ix1>,
    data_y: &nd::ArrayBase<T, nd::Ix1>,
) -> A
where
    S: nd::Data<Elem = A>,
    T: nd::Data<Elem = A>,
    A: Float,
{
    let n = data_x.len();
    if n == 0 || x < data_x[0] || x > data_x[n - 1] || x.is_nan() {
        return A::zero();
    }
    if n == 1 { return data_y[0]; }
    // first index with data_x[i] > x, clamped so that [i - 1, i] is a segment
    let i
        = data_x.as_slice()
        .map(|xs| xs.partition_point(|xi| *xi <= x))
        .unwrap_or_else(|| data_x.iter().take_while(|xi| **xi <= x).count())
        .clamp(1, n - 1);
    let (x0, x1) = (data_x[i - 1], data_x[i]);
    let (y0, y1) = (data_y[i - 1], data_y[i]);
    if x1 == x0 { return y0; }
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Interpolate complex samples in polar form.
///
/// The squared magnitude and the two components of the unit phase vector are
/// interpolated independently with [`linear`]. The result is
/// `sqrt(max(r², 0)) * p / |p|`, where a vanishing phase vector `p` is taken to
/// be `1`.
pub fn polar<R, S, T>(
    x: &nd::ArrayBase<R, nd::Ix1>,
    data_x: &nd::ArrayBase<S, nd::Ix1>,
    data_z: &nd::ArrayBase<T, nd::Ix1>,
) -> InterpResult<nd::Array1<C64>>
where
    R: nd::Data<Elem = f64>,
    S: nd::Data<Elem = f64>,
    T: nd::Data<Elem = C64>,
{
    LengthError::check(data_x, data_z)?;
    let r2: nd::Array1<f64> = data_z.mapv(|z| z.norm_sqr());
    let (pre, pim): (Vec<f64>, Vec<f64>)
        = data_z.iter()
        .map(|z| {
            let zn = z.norm();
            if zn > 0.0 { (z.re / zn, z.im / zn) } else { (1.0, 0.0) }
        })
        .unzip();
    let r2_x = linear(x, data_x, &r2)?;
    let pre_x = linear(x, data_x, &nd::Array1::from(pre))?;
    let pim_x = linear(x, data_x, &nd::Array1::from(pim))?;
    let res: nd::Array1<C64>
        = r2_x.iter().zip(&pre_x).zip(&pim_x)
        .map(|((r2k, rek), imk)| {
            let p = C64::new(*rek, *imk);
            let pnorm = p.norm();
            let phase = if pnorm > 0.0 { p / pnorm } else { C64::from(1.0) };
            phase * r2k.max(0.0).sqrt()
        })
        .collect();
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_is_zero_outside_and_exact_on_nodes() {
        let x = nd::array![1.0, 2.0, 4.0];
        let y = nd::array![3.0, -1.0, 5.0];
        let res = linear(&x, &x, &y).unwrap();
        assert_eq!(res, y);
        let out = linear(&nd::array![0.999, 4.001, f64::NAN], &x, &y).unwrap();
        assert!(out.iter().all(|v| *v == 0.0));
        let mid = linear(&nd::array![1.5, 3.0], &x, &y).unwrap();
        assert!((mid[0] - 1.0).abs() < 1e-15);
        assert!((mid[1] - 2.0).abs() < 1e-15);
    }

    #[test]
    fn linear_handles_strided_data() {
        let both = nd::array![[0.0, 10.0], [1.0, 20.0], [2.0, 30.0]];
        let res = linear(
            &nd::array![0.5, 1.5], &both.column(0), &both.column(1)).unwrap();
        assert_eq!(res.to_vec(), vec![15.0, 25.0]);
    }

    #[test]
    fn linear_rejects_mismatched_lengths() {
        let x = nd::array![0.0, 1.0];
        assert!(linear(&x, &x, &nd::array![1.0]).is_err());
    }

    #[test]
    fn polar_keeps_unit_phase_and_magnitude() {
        let x = nd::array![0.0, 1.0];
        let z = nd::array![C64::new(0.0, 2.0), C64::new(2.0, 0.0)];
        let res = polar(&nd::array![0.0, 0.5, 1.0, 1.5], &x, &z).unwrap();
        assert!((res[0] - z[0]).norm() < 1e-14);
        assert!((res[2] - z[1]).norm() < 1e-14);
        // halfway between i and 1 lies e^{iπ/4}, at the same magnitude
        let expected = C64::from_polar(2.0, std::f64::consts::FRAC_PI_4);
        assert!((res[1] - expected).norm() < 1e-14);
        assert_eq!(res[3], C64::from(0.0));
    }

    #[test]
    fn polar_maps_vanishing_phase_to_one() {
        let x = nd::array![0.0, 1.0];
        let z = nd::array![C64::new(1.0, 0.0), C64::new(-1.0, 0.0)];
        let res = polar(&nd::array![0.5], &x, &z).unwrap();
        assert!((res[0] - C64::from(1.0)).norm() < 1e-14);
    }
}
