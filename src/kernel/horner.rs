use std::f64::consts::PI;

use crate::kernel::{KernelParams, MAX_KERNEL_WIDTH};
use crate::utils::fft::NufftFloat;

/// Extra polynomial degree on top of the kernel width
const EXTRA_DEGREE: usize = 3;

/// Piecewise-polynomial kernel approximation.
///
/// The support `[-w/2, w/2]` is split into `w` unit intervals. Interval `j`
/// holds one polynomial in `z = 2x + w - 1`, where `x` is the offset of the
/// leftmost touched cell, so all `w` weights of a point share the same `z`.
///
/// ### Fields
///
/// * `width` - Kernel width `w`
/// * `num_coeffs` - Coefficients per interval (degree + 1)
/// * `coeffs` - `width * num_coeffs` monomial coefficients, highest degree
///   first within each interval
pub struct HornerKernel<T> {
    width: usize,
    num_coeffs: usize,
    coeffs: Vec<T>,
}

impl<T: NufftFloat> HornerKernel<T> {
    /// Fit the per-interval polynomials by Chebyshev interpolation.
    ///
    /// ### Params
    ///
    /// * `params` - Kernel to approximate
    ///
    /// ### Returns
    ///
    /// The fitted evaluator
    pub fn fit(params: &KernelParams<T>) -> Self {
        let width = params.width;
        let num_coeffs = width + EXTRA_DEGREE + 1;
        let half = width as f64 / 2.0;
        let mut coeffs = Vec::with_capacity(width * num_coeffs);

        for j in 0..width {
            let left = -half + j as f64;
            let cheb = chebyshev_coefficients(num_coeffs, |z| {
                params.evaluate_f64(left + (z + 1.0) / 2.0)
            });
            let mono = chebyshev_to_monomial(&cheb);
            coeffs.extend(mono.iter().rev().map(|&c| T::from_f64_lossy(c)));
        }

        Self {
            width,
            num_coeffs,
            coeffs,
        }
    }

    /// Kernel width `w`
    pub fn width(&self) -> usize {
        self.width
    }

    /// Polynomial degree per interval
    pub fn degree(&self) -> usize {
        self.num_coeffs - 1
    }

    /// Write the `w` kernel weights for leftmost offset `x1`.
    #[inline]
    pub fn fill(&self, x1: T, out: &mut [T; MAX_KERNEL_WIDTH]) {
        let two = T::one() + T::one();
        let z = two * x1 + T::from_f64_lossy(self.width as f64 - 1.0);
        for (j, poly) in self.coeffs.chunks_exact(self.num_coeffs).enumerate() {
            let mut acc = poly[0];
            for &c in &poly[1..] {
                acc = acc * z + c;
            }
            out[j] = acc;
        }
    }
}

/////////////
// Helpers //
/////////////

/// Chebyshev coefficients of `f` on [-1, 1] from `n` first-kind nodes.
fn chebyshev_coefficients(n: usize, f: impl Fn(f64) -> f64) -> Vec<f64> {
    let nf = n as f64;
    let values: Vec<f64> = (0..n)
        .map(|k| f((PI * (k as f64 + 0.5) / nf).cos()))
        .collect();

    (0..n)
        .map(|m| {
            let sum: f64 = values
                .iter()
                .enumerate()
                .map(|(k, v)| v * (PI * m as f64 * (k as f64 + 0.5) / nf).cos())
                .sum();
            let a = 2.0 * sum / nf;
            if m == 0 {
                a / 2.0
            } else {
                a
            }
        })
        .collect()
}

/// Convert a Chebyshev series to monomial coefficients (lowest degree
/// first) via `T_{m+1} = 2z T_m - T_{m-1}`.
fn chebyshev_to_monomial(cheb: &[f64]) -> Vec<f64> {
    let n = cheb.len();
    let mut mono = vec![0.0; n];
    let mut t_prev = vec![0.0; n];
    let mut t_cur = vec![0.0; n];
    t_prev[0] = 1.0;
    mono[0] += cheb[0];
    if n == 1 {
        return mono;
    }
    t_cur[1] = 1.0;
    mono[1] += cheb[1];

    for m in 2..n {
        let mut t_next = vec![0.0; n];
        for k in 0..n {
            let shifted = if k > 0 { 2.0 * t_cur[k - 1] } else { 0.0 };
            t_next[k] = shifted - t_prev[k];
        }
        for k in 0..n {
            mono[k] += cheb[m] * t_next[k];
        }
        t_prev = std::mem::replace(&mut t_cur, t_next);
    }
    mono
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelEvalAlgo, KernelEvaluator};

    #[test]
    fn test_chebyshev_reproduces_polynomial() {
        let cheb = chebyshev_coefficients(5, |z| 3.0 * z * z * z - z + 0.5);
        let mono = chebyshev_to_monomial(&cheb);
        let expected = [0.5, -1.0, 0.0, 3.0, 0.0];
        for (got, want) in mono.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{:?}", mono);
        }
    }

    #[test]
    fn test_horner_matches_direct() {
        for (tol, sigma) in [(1e-3, 2.0), (1e-6, 2.0), (1e-9, 2.0), (1e-6, 1.25)] {
            let params = KernelParams::<f64>::from_tolerance(tol, sigma);
            let horner = HornerKernel::fit(&params);
            let direct = KernelEvaluator::new(&params, KernelEvalAlgo::Direct).unwrap();
            let peak = params.beta.exp();

            let mut a = [0.0; MAX_KERNEL_WIDTH];
            let mut b = [0.0; MAX_KERNEL_WIDTH];
            let mut max_err: f64 = 0.0;
            for step in 1..200 {
                let x1 = -params.half_width + step as f64 / 200.0;
                horner.fill(x1, &mut a);
                direct.fill(x1, &mut b);
                for j in 0..params.width {
                    max_err = max_err.max((a[j] - b[j]).abs() / peak);
                }
            }
            assert!(
                max_err < tol,
                "tol {:.0e} sigma {}: max relative error = {:.2e}",
                tol,
                sigma,
                max_err
            );
            assert_eq!(horner.degree(), params.width + EXTRA_DEGREE);
        }
    }
}
