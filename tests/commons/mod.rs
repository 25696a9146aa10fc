#![allow(dead_code)]

use num_complex::Complex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

/// Uniform random coordinates in `[-pi, pi)`, one vector per axis
pub fn random_points(rank: usize, n: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rank)
        .map(|_| (0..n).map(|_| rng.random::<f64>() * 2.0 * PI - PI).collect())
        .collect()
}

/// Same as `random_points`, converted to f32
pub fn random_points_f32(rank: usize, n: usize, seed: u64) -> Vec<Vec<f32>> {
    random_points(rank, n, seed)
        .into_iter()
        .map(|axis| axis.into_iter().map(|x| x as f32).collect())
        .collect()
}

/// Complex values with both parts uniform in `[-1, 1)`
pub fn random_complex(n: usize, seed: u64) -> Vec<Complex<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            Complex::new(
                rng.random::<f64>() * 2.0 - 1.0,
                rng.random::<f64>() * 2.0 - 1.0,
            )
        })
        .collect()
}

pub fn random_complex_f32(n: usize, seed: u64) -> Vec<Complex<f32>> {
    random_complex(n, seed)
        .into_iter()
        .map(|c| Complex::new(c.re as f32, c.im as f32))
        .collect()
}

/// Borrow per-axis vectors as slices
pub fn as_slices<T>(coords: &[Vec<T>]) -> Vec<&[T]> {
    coords.iter().map(|c| &c[..]).collect()
}

/// Pad mode counts to three axes with 1s
pub fn dims3(grid_dims: &[usize]) -> [usize; 3] {
    let mut d = [1usize; 3];
    d[..grid_dims.len()].copy_from_slice(grid_dims);
    d
}

/// `||a - b||_2 / ||b||_2`, computed in f64
pub fn relative_l2_error<T>(a: &[Complex<T>], b: &[Complex<T>]) -> f64
where
    T: Copy + Into<f64>,
{
    assert_eq!(a.len(), b.len());
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dr = x.re.into() - y.re.into();
        let di = x.im.into() - y.im.into();
        num += dr * dr + di * di;
        den += y.re.into() * y.re.into() + y.im.into() * y.im.into();
    }
    (num / den.max(f64::MIN_POSITIVE)).sqrt()
}
