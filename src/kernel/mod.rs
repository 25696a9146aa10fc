pub mod horner;

use num_traits::Float;
use std::f64::consts::PI;

use crate::error::{NufftError, Result};
use crate::kernel::horner::HornerKernel;
use crate::params::{Backend, KernelEvalAlgo};
use crate::utils::fft::NufftFloat;

/// Widest supported kernel; per-point weight buffers are sized by this
pub const MAX_KERNEL_WIDTH: usize = 16;

/// Beta/width ratio for the standard upsampling factor
const BETA_OVER_WIDTH: f64 = 2.30;

/// Shrinks the custom-sigma beta below the theoretical optimum
const CUSTOM_SIGMA_GAMMA: f64 = 0.97;

/// Upsampling factors with a Horner fit available
pub const HORNER_UPSAMPLING_FACTORS: [f64; 2] = [2.0, 1.25];

//////////////////
// KernelParams //
//////////////////

/// Parameters of the "exponential of semicircle" kernel
/// `phi(x) = exp(beta * sqrt(1 - c x^2))` for `|x| < w/2`.
///
/// ### Fields
///
/// * `width` - Number of fine grid cells touched per axis (`w`)
/// * `beta` - Shape parameter
/// * `c` - `4 / w^2`
/// * `half_width` - `w / 2`
/// * `upsampling_factor` - Fine grid oversampling the kernel was tuned for
/// * `scale` - Normalisation applied in spread-only mode, 1 otherwise
#[derive(Clone, Debug)]
pub struct KernelParams<T> {
    pub width: usize,
    pub beta: T,
    pub c: T,
    pub half_width: T,
    pub upsampling_factor: f64,
    pub scale: T,
}

impl<T: NufftFloat> KernelParams<T> {
    /// Derive kernel parameters from a tolerance.
    ///
    /// ### Params
    ///
    /// * `tol` - Requested relative accuracy (already clamped to machine
    ///   epsilon)
    /// * `upsampling_factor` - Fine grid oversampling
    ///
    /// ### Returns
    ///
    /// Kernel parameters with `scale = 1`
    pub fn from_tolerance(tol: T, upsampling_factor: f64) -> Self {
        let tol = tol.to_f64_lossy();
        let standard = upsampling_factor == 2.0;

        let raw_width = if standard {
            (-(tol / 10.0).log10()).ceil()
        } else {
            (-tol.ln() / (PI * (1.0 - 1.0 / upsampling_factor).sqrt())).ceil()
        };
        let mut width = (raw_width.max(2.0)) as usize;
        if width > MAX_KERNEL_WIDTH {
            log::warn!(
                "kernel width {} for tol {:.1e} exceeds the maximum, clipping to {}",
                width,
                tol,
                MAX_KERNEL_WIDTH
            );
            width = MAX_KERNEL_WIDTH;
        }

        let ratio = if standard {
            match width {
                2 => 2.20,
                3 => 2.26,
                4 => 2.38,
                _ => BETA_OVER_WIDTH,
            }
        } else {
            CUSTOM_SIGMA_GAMMA * PI * (1.0 - 1.0 / (2.0 * upsampling_factor))
        };
        let w = width as f64;

        Self {
            width,
            beta: T::from_f64_lossy(ratio * w),
            c: T::from_f64_lossy(4.0 / (w * w)),
            half_width: T::from_f64_lossy(w / 2.0),
            upsampling_factor,
            scale: T::one(),
        }
    }

    /// Attach the spread-only normalisation `1 / I^rank`, where `I` is the
    /// trapezoid-rule integral of the kernel over its support.
    pub fn with_spread_only_scale(mut self, rank: usize) -> Self {
        let integral = self.integral();
        self.scale = T::from_f64_lossy(1.0 / integral.powi(rank as i32));
        self
    }

    /// Integral of the kernel over its support (100-interval trapezoid
    /// rule in the scaled variable)
    pub fn integral(&self) -> f64 {
        let n = 100;
        let h = 2.0 / n as f64;
        let beta = self.beta.to_f64_lossy();
        let mut x = -1.0;
        let mut sum = 0.0;
        for _ in 1..n {
            x += h;
            sum += (beta * (1.0 - x * x).sqrt()).exp();
        }
        sum += 1.0;
        sum *= h;
        sum * (1.0 / self.c.to_f64_lossy()).sqrt()
    }

    /// Kernel value at a single offset
    #[inline]
    pub fn evaluate(&self, x: T) -> T {
        if Float::abs(x) >= self.half_width {
            return T::zero();
        }
        (self.beta * (T::one() - self.c * x * x).sqrt()).exp()
    }

    /// Kernel value at a single offset, computed in f64 (setup-time fits
    /// and quadratures)
    pub fn evaluate_f64(&self, x: f64) -> f64 {
        if x.abs() >= self.half_width.to_f64_lossy() {
            return 0.0;
        }
        let c = self.c.to_f64_lossy();
        (self.beta.to_f64_lossy() * (1.0 - c * x * x).sqrt()).exp()
    }
}

/////////////////////
// KernelEvaluator //
/////////////////////

/// Resolve `Auto` to a concrete evaluation algorithm and validate Horner.
///
/// ### Params
///
/// * `algo` - Requested algorithm
/// * `upsampling_factor` - Fine grid oversampling
/// * `backend` - Device defaults to direct evaluation
///
/// ### Returns
///
/// `Direct` or `Horner`, or `Unimplemented` for Horner at a custom factor
pub fn resolve_kernel_eval_algo(
    algo: KernelEvalAlgo,
    upsampling_factor: f64,
    backend: Backend,
) -> Result<KernelEvalAlgo> {
    let horner_ok = HORNER_UPSAMPLING_FACTORS.contains(&upsampling_factor);
    match algo {
        KernelEvalAlgo::Direct => Ok(KernelEvalAlgo::Direct),
        KernelEvalAlgo::Horner if horner_ok => Ok(KernelEvalAlgo::Horner),
        KernelEvalAlgo::Horner => Err(NufftError::unimplemented(format!(
            "Horner kernel evaluation needs an upsampling factor of 2.0 or 1.25, got {}",
            upsampling_factor
        ))),
        KernelEvalAlgo::Auto => match backend {
            Backend::Host if horner_ok => Ok(KernelEvalAlgo::Horner),
            _ => Ok(KernelEvalAlgo::Direct),
        },
    }
}

/// Evaluates the `w` kernel weights a point contributes along one axis.
pub enum KernelEvaluator<T: NufftFloat> {
    Direct(KernelParams<T>),
    Horner(HornerKernel<T>),
}

impl<T: NufftFloat> KernelEvaluator<T> {
    /// Build the evaluator for a resolved algorithm.
    ///
    /// ### Params
    ///
    /// * `params` - Kernel parameters
    /// * `algo` - `Direct` or `Horner` (`Auto` resolves as on the host)
    pub fn new(params: &KernelParams<T>, algo: KernelEvalAlgo) -> Result<Self> {
        let algo = resolve_kernel_eval_algo(algo, params.upsampling_factor, Backend::Host)?;
        Ok(match algo {
            KernelEvalAlgo::Horner => KernelEvaluator::Horner(HornerKernel::fit(params)),
            _ => KernelEvaluator::Direct(params.clone()),
        })
    }

    /// Which algorithm this evaluator runs
    pub fn algo(&self) -> KernelEvalAlgo {
        match self {
            KernelEvaluator::Direct(_) => KernelEvalAlgo::Direct,
            KernelEvaluator::Horner(_) => KernelEvalAlgo::Horner,
        }
    }

    /// Kernel width `w`
    #[inline]
    pub fn width(&self) -> usize {
        match self {
            KernelEvaluator::Direct(p) => p.width,
            KernelEvaluator::Horner(h) => h.width(),
        }
    }

    /// Kernel half width `w / 2`
    #[inline]
    pub fn half_width(&self) -> T {
        T::from_f64_lossy(self.width() as f64 / 2.0)
    }

    /// Leftmost touched cell and kernel weights of one point.
    ///
    /// ### Params
    ///
    /// * `p` - Folded coordinates (unused axes ignored)
    /// * `rank` - Number of active axes
    /// * `ker` - Per-axis weight buffers; unused axes get a single 1
    ///
    /// ### Returns
    ///
    /// `ceil(x - w/2)` per active axis, 0 on unused axes
    #[inline]
    pub fn footprint(
        &self,
        p: &[T; 3],
        rank: usize,
        ker: &mut [[T; MAX_KERNEL_WIDTH]; 3],
    ) -> [i64; 3] {
        let hw = self.half_width();
        let lo = -hw;
        let hi = lo + T::one();
        let mut starts = [0i64; 3];
        for axis in 0..3 {
            if axis >= rank {
                ker[axis][0] = T::one();
                continue;
            }
            let start = (p[axis] - hw).ceil();
            let x1 = (start - p[axis]).max(lo).min(hi);
            self.fill(x1, &mut ker[axis]);
            starts[axis] = start.to_f64_lossy() as i64;
        }
        starts
    }

    /// Write `phi(x1 + j)` for `j = 0..w` into `out`.
    ///
    /// ### Params
    ///
    /// * `x1` - Offset of the leftmost touched cell from the point, in
    ///   `[-w/2, -w/2 + 1]`
    /// * `out` - Weight buffer; entries past `w` are left untouched
    #[inline]
    pub fn fill(&self, x1: T, out: &mut [T; MAX_KERNEL_WIDTH]) {
        match self {
            KernelEvaluator::Direct(p) => fill_direct(p, x1, out),
            KernelEvaluator::Horner(h) => h.fill(x1, out),
        }
    }
}

/// Direct evaluation in separate passes: exponent arguments, exponentials,
/// then zeroing of offsets outside the support.
#[inline]
fn fill_direct<T: NufftFloat>(p: &KernelParams<T>, x1: T, out: &mut [T; MAX_KERNEL_WIDTH]) {
    let w = p.width;
    let mut offsets = [T::zero(); MAX_KERNEL_WIDTH];
    let mut z = x1;
    for j in 0..w {
        offsets[j] = z;
        z = z + T::one();
    }

    for j in 0..w {
        out[j] = p.beta * (T::one() - p.c * offsets[j] * offsets[j]).sqrt();
    }
    for j in 0..w {
        out[j] = out[j].exp();
    }
    for j in 0..w {
        if Float::abs(offsets[j]) >= p.half_width {
            out[j] = T::zero();
        }
    }
}

///////////
// Tests //
///////////
