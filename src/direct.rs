//! Direct-sum transforms: `O(M * N)` references used to validate the fast
//! path. Coordinates are angles in `[-pi, pi)`.

use num_complex::Complex;
use rayon::prelude::*;

use crate::params::{FftDirection, ModeOrder};
use crate::utils::fft::NufftFloat;

/// Frequency stored at position `i` of a mode axis of length `m`.
#[inline]
pub fn mode_frequency(i: usize, m: usize, order: ModeOrder) -> i64 {
    let half = (m / 2) as i64;
    match order {
        ModeOrder::Cmcl => i as i64 - half,
        ModeOrder::Fft => {
            if i <= (m - 1) / 2 {
                i as i64
            } else {
                i as i64 - m as i64
            }
        }
    }
}

/// Frequencies of every flat mode index
fn mode_table(rank: usize, grid_dims: [usize; 3], order: ModeOrder) -> Vec<[i64; 3]> {
    let total: usize = grid_dims.iter().product();
    (0..total)
        .map(|g| {
            let idx = [
                g % grid_dims[0],
                (g / grid_dims[0]) % grid_dims[1],
                g / (grid_dims[0] * grid_dims[1]),
            ];
            let mut k = [0i64; 3];
            for axis in 0..rank {
                k[axis] = mode_frequency(idx[axis], grid_dims[axis], order);
            }
            k
        })
        .collect()
}

#[inline]
fn phase(k: &[i64; 3], x: &[f64; 3], sign: f64) -> Complex<f64> {
    let arg = sign * (k[0] as f64 * x[0] + k[1] as f64 * x[1] + k[2] as f64 * x[2]);
    Complex::new(arg.cos(), arg.sin())
}

fn point<T: NufftFloat>(coords: &[&[T]], j: usize) -> [f64; 3] {
    let mut x = [0.0; 3];
    for (axis, c) in coords.iter().enumerate() {
        x[axis] = c[j].to_f64_lossy();
    }
    x
}

/// Direct type 1 sum `f_k = sum_j c_j exp(s i k . x_j)`.
///
/// ### Params
///
/// * `coords` - One coordinate slice per active axis
/// * `weights` - `M` point strengths
/// * `grid_dims` - Mode counts (unused axes 1)
/// * `direction` - Exponent sign `s`
/// * `order` - Mode layout of the output
///
/// ### Returns
///
/// The modes, accumulated in f64
pub fn type1<T: NufftFloat>(
    coords: &[&[T]],
    weights: &[Complex<T>],
    grid_dims: [usize; 3],
    direction: FftDirection,
    order: ModeOrder,
) -> Vec<Complex<T>> {
    let sign = direction.sign();
    let modes = mode_table(coords.len(), grid_dims, order);
    modes
        .par_iter()
        .map(|k| {
            let sum: Complex<f64> = weights
                .iter()
                .enumerate()
                .map(|(j, c)| {
                    let c = Complex::new(c.re.to_f64_lossy(), c.im.to_f64_lossy());
                    c * phase(k, &point(coords, j), sign)
                })
                .sum();
            Complex::new(T::from_f64_lossy(sum.re), T::from_f64_lossy(sum.im))
        })
        .collect()
}

/// Direct type 2 sum `c_j = sum_k f_k exp(s i k . x_j)`.
///
/// ### Params
///
/// * `coords` - One coordinate slice per active axis
/// * `modes` - Mode array in `order` layout
/// * `grid_dims` - Mode counts (unused axes 1)
/// * `direction` - Exponent sign `s`
/// * `order` - Mode layout of the input
///
/// ### Returns
///
/// One value per point
pub fn type2<T: NufftFloat>(
    coords: &[&[T]],
    modes: &[Complex<T>],
    grid_dims: [usize; 3],
    direction: FftDirection,
    order: ModeOrder,
) -> Vec<Complex<T>> {
    let sign = direction.sign();
    let table = mode_table(coords.len(), grid_dims, order);
    let m = coords.first().map_or(0, |c| c.len());
    (0..m)
        .into_par_iter()
        .map(|j| {
            let x = point(coords, j);
            let sum: Complex<f64> = table
                .iter()
                .zip(modes)
                .map(|(k, f)| {
                    Complex::new(f.re.to_f64_lossy(), f.im.to_f64_lossy()) * phase(k, &x, sign)
                })
                .sum();
            Complex::new(T::from_f64_lossy(sum.re), T::from_f64_lossy(sum.im))
        })
        .collect()
}
