use num_complex::Complex;
use std::f64::consts::PI;

use crate::kernel::KernelParams;
use crate::params::ModeOrder;
use crate::utils::fft::NufftFloat;
use crate::utils::math::gauss_legendre;

////////////////////
// Fourier series //
////////////////////

/// Fourier-series coefficients of the spreading kernel on a fine grid of
/// `nf` cells, for frequencies `0..=nf/2`.
///
/// The kernel transform is evaluated by Gauss-Legendre quadrature over the
/// positive half of its support; the alternating sign accounts for points
/// being placed half a period into the fine grid.
///
/// ### Params
///
/// * `nf` - Fine grid size along this axis
/// * `params` - Kernel parameters
///
/// ### Returns
///
/// `nf / 2 + 1` real coefficients
pub fn kernel_fseries_1d<T: NufftFloat>(nf: usize, params: &KernelParams<T>) -> Vec<T> {
    let hw = params.width as f64 / 2.0;
    let q = (2.0 + 3.0 * hw) as usize;
    let (nodes, weights) = gauss_legendre(2 * q);

    let (z, f): (Vec<f64>, Vec<f64>) = nodes[..q]
        .iter()
        .zip(&weights[..q])
        .map(|(&x, &wt)| {
            let z = hw * x;
            (z, hw * wt * params.evaluate_f64(z))
        })
        .unzip();

    let nf_f = nf as f64;
    (0..=nf / 2)
        .map(|j| {
            let sum: f64 = z
                .iter()
                .zip(&f)
                .map(|(&zn, &fn_)| 2.0 * fn_ * (2.0 * PI * j as f64 * zn / nf_f).cos())
                .sum();
            let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
            T::from_f64_lossy(sign * sum)
        })
        .collect()
}

/// Start positions of the non-negative and negative frequency blocks of a
/// mode axis of length `m`.
///
/// ### Returns
///
/// Tuple of `(pp, pn)`
fn mode_block_starts(m: usize, order: ModeOrder) -> (usize, usize) {
    let kmax = (m - 1) / 2;
    match order {
        ModeOrder::Fft => (0, kmax + 1),
        ModeOrder::Cmcl => (m / 2, 0),
    }
}

/////////////////
// Deconvolver //
/////////////////

/// Converts between physical modes and fine-grid Fourier data.
///
/// Multi-dimensional transforms are handled axis by axis from the slowest
/// axis down, each level scaling the running prefactor by the inverse
/// kernel coefficient of its frequency.
///
/// ### Fields
///
/// * `grid_dims` - Mode counts per axis, 1 on unused axes
/// * `fine_dims` - Fine grid dims per axis, 1 on unused axes
/// * `rank` - Number of active axes
/// * `mode_order` - Layout of the mode array
/// * `fseries` - Kernel Fourier coefficients per active axis
#[derive(Clone, Debug)]
pub struct Deconvolver<T> {
    pub grid_dims: [usize; 3],
    pub fine_dims: [usize; 3],
    pub rank: usize,
    pub mode_order: ModeOrder,
    pub fseries: Vec<Vec<T>>,
}

impl<T: NufftFloat> Deconvolver<T> {
    /// Precompute the kernel Fourier series for every active axis.
    ///
    /// ### Params
    ///
    /// * `rank` - Number of active axes
    /// * `grid_dims` - Mode counts (>= 1)
    /// * `fine_dims` - Fine grid dims
    /// * `params` - Kernel parameters
    /// * `mode_order` - Layout of the mode array
    pub fn new(
        rank: usize,
        grid_dims: [usize; 3],
        fine_dims: [usize; 3],
        params: &KernelParams<T>,
        mode_order: ModeOrder,
    ) -> Self {
        let fseries = (0..rank)
            .map(|axis| kernel_fseries_1d(fine_dims[axis], params))
            .collect();
        Self {
            grid_dims,
            fine_dims,
            rank,
            mode_order,
            fseries,
        }
    }

    /// Elements in one mode array
    pub fn modes_len(&self) -> usize {
        self.grid_dims.iter().product()
    }

    /// Elements in one fine grid
    pub fn fine_len(&self) -> usize {
        self.fine_dims.iter().product()
    }

    /// Read the modes out of one transformed fine grid, dividing by the
    /// kernel coefficients.
    ///
    /// ### Params
    ///
    /// * `fw` - One fine grid after the FFT
    /// * `fk` - One mode array, overwritten
    pub fn modes_from_fine(&self, fw: &[Complex<T>], fk: &mut [Complex<T>]) {
        self.extract(self.rank - 1, fw, fk, T::one());
    }

    /// Write one fine grid from modes, dividing by the kernel coefficients
    /// and zero-filling the oversampling gap.
    ///
    /// ### Params
    ///
    /// * `fk` - One mode array
    /// * `fw` - One fine grid, overwritten
    pub fn fine_from_modes(&self, fk: &[Complex<T>], fw: &mut [Complex<T>]) {
        self.pad(self.rank - 1, fk, fw, T::one());
    }

    fn extract(&self, axis: usize, fw: &[Complex<T>], fk: &mut [Complex<T>], prefactor: T) {
        let m = self.grid_dims[axis];
        let nf = self.fine_dims[axis];
        let ker = &self.fseries[axis];
        let (pp, pn) = mode_block_starts(m, self.mode_order);
        let kmax = (m - 1) / 2;
        let nneg = m / 2;

        if axis == 0 {
            for k in 0..=kmax {
                fk[pp + k] = fw[k] * (prefactor / ker[k]);
            }
            for k in 1..=nneg {
                fk[pn + nneg - k] = fw[nf - k] * (prefactor / ker[k]);
            }
            return;
        }

        let mb: usize = self.grid_dims[..axis].iter().product();
        let fb: usize = self.fine_dims[..axis].iter().product();
        for k in 0..=kmax {
            let dst = (pp + k) * mb;
            self.extract(
                axis - 1,
                &fw[k * fb..(k + 1) * fb],
                &mut fk[dst..dst + mb],
                prefactor / ker[k],
            );
        }
        for k in 1..=nneg {
            let dst = (pn + nneg - k) * mb;
            let src = (nf - k) * fb;
            self.extract(
                axis - 1,
                &fw[src..src + fb],
                &mut fk[dst..dst + mb],
                prefactor / ker[k],
            );
        }
    }

    fn pad(&self, axis: usize, fk: &[Complex<T>], fw: &mut [Complex<T>], prefactor: T) {
        let m = self.grid_dims[axis];
        let nf = self.fine_dims[axis];
        let ker = &self.fseries[axis];
        let (pp, pn) = mode_block_starts(m, self.mode_order);
        let kmax = (m - 1) / 2;
        let nneg = m / 2;
        let fb: usize = self.fine_dims[..axis].iter().product();
        let zero = Complex::new(T::zero(), T::zero());

        fw[(kmax + 1) * fb..(nf - nneg) * fb].fill(zero);

        if axis == 0 {
            for k in 0..=kmax {
                fw[k] = fk[pp + k] * (prefactor / ker[k]);
            }
            for k in 1..=nneg {
                fw[nf - k] = fk[pn + nneg - k] * (prefactor / ker[k]);
            }
            return;
        }

        let mb: usize = self.grid_dims[..axis].iter().product();
        for k in 0..=kmax {
            let src = (pp + k) * mb;
            self.pad(
                axis - 1,
                &fk[src..src + mb],
                &mut fw[k * fb..(k + 1) * fb],
                prefactor / ker[k],
            );
        }
        for k in 1..=nneg {
            let src = (pn + nneg - k) * mb;
            let dst = (nf - k) * fb;
            self.pad(
                axis - 1,
                &fk[src..src + mb],
                &mut fw[dst..dst + fb],
                prefactor / ker[k],
            );
        }
    }
}

///////////
// Tests //
///////////
