use rayon::prelude::*;
use std::f64::consts::PI;

use crate::ensure_same_len;
use crate::error::{NufftError, Result};
use crate::params::PointDomain;
use crate::utils::fft::NufftFloat;

/// Fold a periodic coordinate into `[0, n)` fine grid units.
///
/// Coordinates are expected within one period of the primary domain
/// (`[-3pi, 3pi]` or `[-n, 2n)`); the fold is a single shift.
///
/// ### Params
///
/// * `x` - Raw coordinate
/// * `n` - Fine grid size along this axis
/// * `domain` - Periodic domain of the raw coordinate
///
/// ### Returns
///
/// Grid-relative coordinate
#[inline]
pub fn fold_rescale<T: NufftFloat>(x: T, n: T, domain: PointDomain) -> T {
    match domain {
        PointDomain::Pi => {
            let pi = T::from_f64_lossy(PI);
            let shift = if x >= -pi {
                if x < pi {
                    pi
                } else {
                    -pi
                }
            } else {
                T::from_f64_lossy(3.0 * PI)
            };
            (x + shift) * (n / T::from_f64_lossy(2.0 * PI))
        }
        PointDomain::Grid => {
            if x >= T::zero() {
                if x < n {
                    x
                } else {
                    x - n
                }
            } else {
                x + n
            }
        }
    }
}

/// Borrowed nonuniform point coordinates with on-the-fly fold/rescale.
///
/// ### Fields
///
/// * `coords` - One slice per active axis; unused axes are empty
/// * `len` - Number of points
/// * `rank` - Number of active axes
/// * `dims` - Fine grid dims the coordinates are rescaled to
/// * `dims_t` - `dims` as floats
/// * `domain` - Periodic domain of the raw coordinates
#[derive(Clone, Copy, Debug)]
pub struct Points<'a, T> {
    coords: [&'a [T]; 3],
    len: usize,
    rank: usize,
    dims: [usize; 3],
    dims_t: [T; 3],
    domain: PointDomain,
}

impl<'a, T: NufftFloat> Points<'a, T> {
    /// Wrap coordinate slices.
    ///
    /// ### Params
    ///
    /// * `coords` - Exactly `rank` slices of equal length
    /// * `rank` - Number of active axes
    /// * `dims` - Fine grid dims
    /// * `domain` - Periodic domain
    ///
    /// ### Returns
    ///
    /// The point set, or `InvalidArgument` for a wrong slice count or
    /// mismatched lengths
    pub fn new(
        coords: &[&'a [T]],
        rank: usize,
        dims: [usize; 3],
        domain: PointDomain,
    ) -> Result<Self> {
        if coords.len() != rank {
            return Err(NufftError::invalid(format!(
                "expected {} coordinate arrays, got {}",
                rank,
                coords.len()
            )));
        }
        match rank {
            1 => {}
            2 => ensure_same_len!(coords[0], coords[1]),
            _ => ensure_same_len!(coords[0], coords[1], coords[2]),
        }

        let empty: &'a [T] = &[];
        let mut slices = [empty; 3];
        slices[..rank].copy_from_slice(coords);

        Ok(Self {
            coords: slices,
            len: coords[0].len(),
            rank,
            dims,
            dims_t: dims.map(|n| T::from_f64_lossy(n as f64)),
            domain,
        })
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no points
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of active axes
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Fine grid dims
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Raw coordinate slice of one axis
    pub fn axis(&self, axis: usize) -> &'a [T] {
        self.coords[axis]
    }

    /// Coordinate of point `i` along `axis`, folded into `[0, N)`
    #[inline]
    pub fn rescaled(&self, axis: usize, i: usize) -> T {
        fold_rescale(self.coords[axis][i], self.dims_t[axis], self.domain)
    }

    /// All active coordinates of point `i`, folded; unused axes are 0
    #[inline]
    pub fn rescaled_point(&self, i: usize) -> [T; 3] {
        let mut out = [T::zero(); 3];
        for (axis, o) in out.iter_mut().enumerate().take(self.rank) {
            *o = self.rescaled(axis, i);
        }
        out
    }

    /// Check every coordinate lies within one period of the domain.
    ///
    /// ### Returns
    ///
    /// `InvalidArgument` naming the first offending point and axis
    pub fn check_range(&self) -> Result<()> {
        for axis in 0..self.rank {
            let (lo, hi) = match self.domain {
                PointDomain::Pi => (-3.0 * PI, 3.0 * PI),
                PointDomain::Grid => {
                    let n = self.dims[axis] as f64;
                    (-n, 2.0 * n)
                }
            };
            let lo_t = T::from_f64_lossy(lo);
            let hi_t = T::from_f64_lossy(hi);

            let bad = self.coords[axis]
                .par_iter()
                .enumerate()
                .find_first(|&(_, &x)| !(x >= lo_t && x <= hi_t));
            if let Some((i, x)) = bad {
                return Err(NufftError::invalid(format!(
                    "point {} has coordinate {} = {} outside [{:.4}, {:.4}]",
                    i,
                    ["x", "y", "z"][axis],
                    x,
                    lo,
                    hi
                )));
            }
        }
        Ok(())
    }
}

///////////
// Tests //
///////////
